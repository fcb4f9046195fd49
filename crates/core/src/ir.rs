//! The internal representation shared by every back end.

use std::fmt;

use crate::scanner::Command;

/// An aggregated operation: what the front end hands to a back end.
///
/// Additive runs are folded into a single signed count. A count is never zero once it leaves
/// [crate::optimize::coalesce].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Add to the current cell (wraps at 8 bits).
    ChangeVal(i32),
    /// Move the cell pointer (wraps at the tape size).
    ChangeAddr(i32),
    PutChar,
    GetChar,
    StartLoop,
    EndLoop,
}

/// The two families of commands that can be folded together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Val,
    Addr,
}

impl Op {
    /// Which additive family this op belongs to, if any.
    pub fn family(self) -> Option<Family> {
        match self {
            Op::ChangeVal(_) => Some(Family::Val),
            Op::ChangeAddr(_) => Some(Family::Addr),
            _ => None,
        }
    }

    pub fn is_additive(self) -> bool {
        self.family().is_some()
    }

    /// Net-zero additive ops do nothing at all.
    pub fn is_nop(self) -> bool {
        matches!(self, Op::ChangeVal(0) | Op::ChangeAddr(0))
    }

    /// Folds two ops of the same family into one.
    ///
    /// Returns `None` when the families differ (or either op is not additive).
    pub fn merge(self, other: Op) -> Option<Op> {
        match (self, other) {
            (Op::ChangeVal(x), Op::ChangeVal(y)) => Some(Op::ChangeVal(x.wrapping_add(y))),
            (Op::ChangeAddr(x), Op::ChangeAddr(y)) => Some(Op::ChangeAddr(x.wrapping_add(y))),
            _ => None,
        }
    }
}

impl From<Command> for Op {
    /// Every command is a run of length one.
    fn from(command: Command) -> Op {
        use Command::*;
        match command {
            Increment => Op::ChangeVal(1),
            Decrement => Op::ChangeVal(-1),
            ShiftRight => Op::ChangeAddr(1),
            ShiftLeft => Op::ChangeAddr(-1),
            Output => Op::PutChar,
            Input => Op::GetChar,
            LoopOpen => Op::StartLoop,
            LoopClose => Op::EndLoop,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Op::ChangeVal(v) => write!(f, "add\t[p], [p], #{}", v),
            Op::ChangeAddr(v) => write!(f, "add\tp, p, #{}", v),
            Op::PutChar => write!(f, "putchar"),
            Op::GetChar => write!(f, "getchar"),
            Op::StartLoop => write!(f, "loop"),
            Op::EndLoop => write!(f, "end"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_become_singleton_runs() {
        assert_eq!(Op::ChangeVal(1), Command::Increment.into());
        assert_eq!(Op::ChangeVal(-1), Command::Decrement.into());
        assert_eq!(Op::ChangeAddr(1), Command::ShiftRight.into());
        assert_eq!(Op::ChangeAddr(-1), Command::ShiftLeft.into());
        assert_eq!(Op::StartLoop, Command::LoopOpen.into());
    }

    #[test]
    fn only_the_same_family_merges() {
        assert_eq!(
            Some(Op::ChangeVal(0)),
            Op::ChangeVal(3).merge(Op::ChangeVal(-3))
        );
        assert_eq!(None, Op::ChangeVal(1).merge(Op::ChangeAddr(1)));
        assert_eq!(None, Op::PutChar.merge(Op::PutChar));
    }

    #[test]
    fn counts_wrap_instead_of_overflowing() {
        assert_eq!(
            Some(Op::ChangeAddr(i32::MIN)),
            Op::ChangeAddr(i32::MAX).merge(Op::ChangeAddr(1))
        );
    }
}
