//! Run-length coalescing: the one and only optimization.

use crate::ir::Op;

/// Folds maximal runs of additive ops into a single op, dropping runs that cancel out.
///
/// Works one op at a time with one op of lookahead, so it can sit directly on top of a
/// [crate::scanner::Scanner]. A nonzero run is held back until the next nonzero run or
/// non-additive op shows up; if a run of the other family vanishes in between, the held run
/// keeps growing. That makes the output a fixed point: coalescing it again changes nothing.
pub struct RunAggregator<I> {
    ops: I,
    lookahead: Option<Op>,
    pending: Option<Op>,
}

/// Coalesces runs in any stream of [Op]s (including one that is already coalesced).
pub fn coalesce<I>(ops: I) -> RunAggregator<I::IntoIter>
where
    I: IntoIterator<Item = Op>,
{
    RunAggregator {
        ops: ops.into_iter(),
        lookahead: None,
        pending: None,
    }
}

impl<I> RunAggregator<I>
where
    I: Iterator<Item = Op>,
{
    fn next_op(&mut self) -> Option<Op> {
        self.lookahead.take().or_else(|| self.ops.next())
    }

    /// Pulls ops of the same family as `first` until something else comes along.
    fn take_run(&mut self, first: Op) -> Op {
        let mut run = first;
        while let Some(op) = self.ops.next() {
            match run.merge(op) {
                Some(merged) => run = merged,
                None => {
                    self.lookahead = Some(op);
                    break;
                }
            }
        }

        run
    }
}

impl<I> Iterator for RunAggregator<I>
where
    I: Iterator<Item = Op>,
{
    type Item = Op;

    fn next(&mut self) -> Option<Op> {
        loop {
            let op = match self.next_op() {
                Some(op) => op,
                None => return self.pending.take(),
            };

            if !op.is_additive() {
                return match self.pending.take() {
                    Some(pending) => {
                        self.lookahead = Some(op);
                        Some(pending)
                    }
                    None => Some(op),
                };
            }

            let mut run = self.take_run(op);
            if let Some(merged) = self.pending.and_then(|pending| pending.merge(run)) {
                self.pending = None;
                run = merged;
            }

            if run.is_nop() {
                continue;
            }

            if let Some(previous) = self.pending.replace(run) {
                return Some(previous);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;
    use Op::*;

    fn aggregate(source: &[u8]) -> Vec<Op> {
        coalesce(scan(source).map(Op::from)).collect()
    }

    #[test]
    fn runs_are_folded() {
        assert_eq!(vec![ChangeVal(4)], aggregate(b"++++"));
        assert_eq!(vec![ChangeAddr(-3)], aggregate(b"<<<"));
        assert_eq!(
            vec![ChangeVal(2), ChangeAddr(1), ChangeVal(-1)],
            aggregate(b"++>-")
        );
    }

    #[test]
    fn opposing_commands_cancel() {
        assert_eq!(vec![ChangeVal(1)], aggregate(b"++-"));
        assert_eq!(vec![ChangeAddr(-1)], aggregate(b"><<"));
    }

    #[test]
    fn balanced_runs_vanish_in_any_order() {
        for source in [&b"+-"[..], b"-+", b"++--", b"+--+", b"-+-+", b"<><>><<>"] {
            assert_eq!(Vec::<Op>::new(), aggregate(source), "{:?}", source);
        }
    }

    #[test]
    fn comments_do_not_break_runs() {
        assert_eq!(vec![ChangeVal(3)], aggregate(b"+ one + two\n+ three"));
    }

    #[test]
    fn other_commands_pass_through_one_by_one() {
        assert_eq!(
            vec![GetChar, GetChar, PutChar, StartLoop, EndLoop, EndLoop],
            aggregate(b",,.[]]")
        );
    }

    #[test]
    fn runs_are_split_by_other_commands() {
        assert_eq!(
            vec![ChangeVal(1), PutChar, ChangeVal(1)],
            aggregate(b"+.+")
        );
        assert_eq!(
            vec![StartLoop, ChangeVal(-1), EndLoop],
            aggregate(b"[-]")
        );
    }

    #[test]
    fn a_vanished_run_does_not_split_its_neighbours() {
        assert_eq!(vec![ChangeVal(2)], aggregate(b"+><+"));
        assert_eq!(vec![ChangeVal(1), ChangeAddr(2)], aggregate(b"+>+->"));
        assert_eq!(Vec::<Op>::new(), aggregate(b"+><-"));
    }

    #[test]
    fn coalescing_is_a_fixed_point() {
        let sources: [&[u8]; 5] = [
            b"++++[>++++<-]>.",
            b"+><+.",
            b"+>+-->[-<+>]<<<>>",
            b">>>>--<<<<++++",
            b",[.,]",
        ];
        for source in sources {
            let once = aggregate(source);
            let twice: Vec<_> = coalesce(once.clone()).collect();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn output_never_contains_a_zero_count() {
        let ops = aggregate(b"+-+-><>< [+-] >+<- .");
        assert!(ops.iter().all(|op| !op.is_nop()));
    }
}
