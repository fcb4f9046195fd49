use std::fmt;

use errno::Errno;

pub type Result<T> = std::result::Result<T, MappingError>;

/// Any error thrown while mapping, protecting, or unmapping memory.
#[derive(Debug, Clone)]
pub enum MappingError {
    /// `mmap(2)` refused to give us a region.
    Map(Errno),
    /// `mprotect(2)` could not change the region's permissions.
    Protect(Errno),
    /// `munmap(2)` could not give the region back.
    Unmap(Errno),
}

impl std::error::Error for MappingError {}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MappingError::Map(e) => write!(f, "mmap: {}", e),
            MappingError::Protect(e) => write!(f, "mprotect: {}", e),
            MappingError::Unmap(e) => write!(f, "munmap: {}", e),
        }
    }
}
