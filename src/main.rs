//! `tapejit`: runs, disassembles or translates Brainfuck programs.

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use structopt::StructOpt;
use tracing::debug;
use tracing_subscriber::{fmt as log_fmt, EnvFilter};

use tapejit_core::{
    compile_to_bytecode, generate_native_code, run_jit, strip_shebang, translate_to_c,
    CompilationError, Error, Limits, Program, Reason, Tape,
};

mod source;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "TAPEJIT_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Bytecode,
    Jit,
    C,
}

impl Backend {
    /// Native code where it can run, the interpreter everywhere else.
    fn for_this_host() -> Self {
        if cfg!(target_arch = "aarch64") {
            Backend::Jit
        } else {
            Backend::Bytecode
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bytecode" => Ok(Backend::Bytecode),
            "jit" => Ok(Backend::Jit),
            "c" => Ok(Backend::C),
            other => Err(format!(
                "unknown backend '{}' (expected bytecode, jit or c)",
                other
            )),
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "tapejit", about = "Runs Brainfuck programs")]
struct Opt {
    /// How to run the program: bytecode, jit, or c (print a C translation).
    /// Defaults to jit on aarch64 and bytecode elsewhere
    #[structopt(short, long)]
    backend: Option<Backend>,

    /// Print the bytecode listing instead of running the program
    #[structopt(short, long)]
    disassemble: bool,

    /// Write the raw AArch64 machine code to standard output instead of running it
    #[structopt(long)]
    emit_native: bool,

    /// Refuse to compile programs longer than this many words
    #[structopt(long, default_value = "1048576")]
    max_program_words: usize,

    /// The program to run. Read from standard input when omitted
    #[structopt(parse(from_os_str))]
    file: Option<PathBuf>,
}

/// Why the driver stopped early.
#[derive(Debug)]
enum Failure {
    Usage,
    Error(Error),
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        Failure::Error(e)
    }
}

impl From<CompilationError> for Failure {
    fn from(e: CompilationError) -> Self {
        Failure::Error(e.into())
    }
}

impl From<io::Error> for Failure {
    fn from(e: io::Error) -> Self {
        Failure::Error(e.into())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Failure::Usage => write!(f, "error: no program given"),
            Failure::Error(Error::Compilation(e)) => write!(f, "{}", e),
            Failure::Error(e) => write!(f, "error: {}", e),
        }
    }
}

fn main() {
    init_logging();
    let opt = Opt::from_args();

    let status = match run(&opt) {
        Ok(()) => 0,
        Err(failure) => {
            let mut stderr = io::stderr();
            if let Failure::Usage = failure {
                Opt::clap().write_help(&mut stderr).ok();
                writeln!(stderr, "\n").ok();
            }
            writeln!(stderr, "{}", failure).ok();
            exit_status(&failure)
        }
    };

    process::exit(status);
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    log_fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(opt: &Opt) -> Result<(), Failure> {
    let source_text = source::read_program(opt.file.as_deref())?.ok_or(Failure::Usage)?;
    let source_text = strip_shebang(&source_text);
    let limits = Limits {
        max_program_words: opt.max_program_words,
    };
    let backend = opt.backend.unwrap_or_else(Backend::for_this_host);
    debug!(?backend, bytes = source_text.len(), "loaded program");

    if opt.emit_native {
        let code = generate_native_code(source_text, &limits)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(&code.to_bytes())?;
        stdout.flush()?;
        return Ok(());
    }

    if opt.disassemble {
        let program = compile_to_bytecode(source_text, &limits)?;
        let mut stdout = io::stdout().lock();
        write!(stdout, "{}", program)?;
        stdout.flush()?;
        return Ok(());
    }

    let mut universe = Tape::new();
    match backend {
        Backend::Bytecode => {
            let program = compile_to_bytecode(source_text, &limits)?;
            program.run(&mut universe)?;
        }
        Backend::Jit => {
            let mut input = io::stdin().lock();
            let mut output = io::BufWriter::new(io::stdout().lock());
            run_jit(source_text, &limits, &mut universe, &mut input, &mut output)?;
            output.flush()?;
        }
        Backend::C => {
            let c = translate_to_c(source_text)?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(c.as_bytes())?;
            stdout.flush()?;
        }
    }

    Ok(())
}

fn exit_status(failure: &Failure) -> i32 {
    let error = match failure {
        Failure::Usage => return 1,
        Failure::Error(error) => error,
    };

    match error {
        Error::InputUnavailable { .. } => 2,
        Error::Compilation(e) => match e.reason() {
            Reason::UnmatchedOpen(_) => 3,
            Reason::UnmatchedClose => 4,
            Reason::ProgramTooLarge | Reason::BranchOutOfRange => 5,
        },
        Error::ExecutableMapFailed(_) => 6,
        Error::ExecutableUnmapFailed(_) => 7,
        Error::UnknownOpcode { .. } => 8,
        Error::Io(_) => 9,
        Error::UnsupportedArchitecture => 10,
    }
}
