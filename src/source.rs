//! Finds the program text.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use tapejit_core::Error;

/// Reads the whole program from `path`, or from standard input when there is no path.
///
/// Returns `None` when there is no path and standard input is a terminal: nobody is going to
/// type a program in, so the caller should print usage instead.
pub fn read_program(path: Option<&Path>) -> Result<Option<Vec<u8>>, Error> {
    match path {
        Some(path) => read_file(path).map(Some),
        None if io::stdin().is_terminal() => Ok(None),
        None => read_all(io::stdin().lock(), Path::new("<stdin>")).map(Some),
    }
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    let file = fs::File::open(path).map_err(|source| unavailable(path, source))?;
    read_all(file, path)
}

fn read_all(mut reader: impl Read, path: &Path) -> Result<Vec<u8>, Error> {
    let mut source_text = Vec::new();
    reader
        .read_to_end(&mut source_text)
        .map_err(|source| unavailable(path, source))?;

    Ok(source_text)
}

fn unavailable(path: &Path, source: io::Error) -> Error {
    Error::InputUnavailable {
        path: PathBuf::from(path),
        source,
    }
}
