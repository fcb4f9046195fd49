//! Translates a program into portable C source.

use tracing::debug;

use crate::errors::CompilationError;
use crate::ir::Op;
use crate::loops::LoopStack;
use crate::tape::TAPE_SIZE;

const INDENT: &str = "    ";

/// Translates aggregated ops into a complete C program.
///
/// The tape is a `unsigned char[65536]` indexed by an `unsigned short`, so both the cells and the
/// position wrap the same way they do in the other back ends.
pub fn translate<I>(ops: I) -> Result<String, CompilationError>
where
    I: IntoIterator<Item = Op>,
{
    let mut emitter = CEmitter::new();
    let mut end = 0;
    for (position, op) in ops.into_iter().enumerate() {
        emitter.statement(op, position)?;
        end = position + 1;
    }
    emitter.finish(end)
}

struct CEmitter {
    source: String,
    loops: LoopStack<usize>,
    statements: usize,
}

impl CEmitter {
    fn new() -> Self {
        let mut source = String::new();
        source.push_str("#include <stdio.h>\n\n");
        source.push_str(&format!("unsigned char data[{}];\n", TAPE_SIZE));
        source.push_str("unsigned short pos = 0;\n\n");
        source.push_str("static int bf_getchar(void)\n");
        source.push_str("{\n");
        source.push_str(INDENT);
        source.push_str("int c = getchar();\n");
        source.push_str(INDENT);
        source.push_str("return c == EOF ? 0 : c;\n");
        source.push_str("}\n\n");
        source.push_str("int main(void)\n");
        source.push_str("{\n");

        CEmitter {
            source,
            loops: LoopStack::new(),
            statements: 0,
        }
    }

    /// Writes one line at the current loop depth.
    fn line(&mut self, text: &str) {
        for _ in 0..=self.loops.depth() {
            self.source.push_str(INDENT);
        }
        self.source.push_str(text);
        self.source.push('\n');
        self.statements += 1;
    }

    fn statement(&mut self, op: Op, position: usize) -> Result<(), CompilationError> {
        match op {
            Op::ChangeVal(n) => {
                if let Some(text) = compound("data[pos]", n) {
                    self.line(&text);
                }
            }
            Op::ChangeAddr(n) => {
                if let Some(text) = compound("pos", n) {
                    self.line(&text);
                }
            }
            Op::PutChar => self.line("putchar(data[pos]);"),
            Op::GetChar => self.line("data[pos] = bf_getchar();"),
            Op::StartLoop => {
                self.line("while (data[pos]) {");
                self.loops.push(position);
            }
            Op::EndLoop => {
                self.loops.pop(position)?;
                self.line("}");
            }
        }

        Ok(())
    }

    fn finish(mut self, end: usize) -> Result<String, CompilationError> {
        std::mem::take(&mut self.loops).finish(end)?;

        self.line("return 0;");
        self.source.push_str("}\n");
        debug!(statements = self.statements, "translated to C");

        Ok(self.source)
    }
}

/// `x++;`, `x -= 3;` and so on. Nothing for a zero count.
fn compound(lvalue: &str, n: i32) -> Option<String> {
    match n {
        0 => None,
        1 => Some(format!("{}++;", lvalue)),
        -1 => Some(format!("{}--;", lvalue)),
        n if n > 0 => Some(format!("{} += {};", lvalue, n)),
        n => Some(format!("{} -= {};", lvalue, n.unsigned_abs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aggregate, Reason};

    fn body(source: &[u8]) -> Vec<String> {
        let c = translate(aggregate(source)).unwrap();
        let start = c.find("int main(void)\n{\n").unwrap() + "int main(void)\n{\n".len();
        c[start..]
            .lines()
            .map(str::to_owned)
            .take_while(|line| !line.ends_with("return 0;"))
            .collect()
    }

    #[test]
    fn preamble_declares_the_tape() {
        let c = translate(aggregate(b"")).unwrap();

        assert!(c.starts_with("#include <stdio.h>\n"));
        assert!(c.contains("unsigned char data[65536];\n"));
        assert!(c.contains("unsigned short pos = 0;\n"));
        assert!(c.contains("return c == EOF ? 0 : c;"));
        assert!(c.ends_with("    return 0;\n}\n"));
    }

    #[test]
    fn one_statement_per_op() {
        assert_eq!(
            vec![
                "    data[pos]++;",
                "    pos += 2;",
                "    data[pos] -= 3;",
                "    pos--;",
                "    putchar(data[pos]);",
                "    data[pos] = bf_getchar();",
            ],
            body(b"+>>---<.,")
        );
    }

    #[test]
    fn cancelled_runs_emit_nothing() {
        assert!(body(b"+-<>").is_empty());
    }

    #[test]
    fn loops_nest_with_indentation() {
        assert_eq!(
            vec![
                "    while (data[pos]) {",
                "        data[pos]--;",
                "        while (data[pos]) {",
                "            pos++;",
                "        }",
                "    }",
            ],
            body(b"[-[>]]")
        );
    }

    #[test]
    fn unmatched_brackets_are_errors() {
        let error = translate(aggregate(b"+]")).unwrap_err();
        assert_eq!(Reason::UnmatchedClose, error.reason());

        let error = translate(aggregate(b"[[")).unwrap_err();
        assert_eq!(Reason::UnmatchedOpen(2), error.reason());
    }
}
