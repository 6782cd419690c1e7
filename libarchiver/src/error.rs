use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("source path {} does not exist", path.display())]
    SourceMissing { path: PathBuf },

    #[error("unsupported file type `{kind}`: {}", path.display())]
    UnsupportedFileType { path: PathBuf, kind: &'static str },

    /// The entry name is empty, absolute, contains a backslash or a `..` segment.
    #[error("archive contains invalid entry name: {name:?}")]
    UnsafePath { name: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt archive stream: {0}")]
    Stream(#[source] io::Error),
}

impl ArchiveError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
        move |source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the error was raised by the entry name check.
    pub fn is_unsafe_path(&self) -> bool {
        matches!(self, ArchiveError::UnsafePath { .. })
    }
}
