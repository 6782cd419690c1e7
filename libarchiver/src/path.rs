use std::{ffi::OsStr, os::unix::ffi::OsStrExt, path::Path};

use crate::error::{ArchiveError, Result};

/// Check an entry name taken from an archive header and return it as a
/// relative path.
///
/// Rejects empty names, names starting with `/`, names containing `\` and names
/// with a `..` segment anywhere.
pub fn checked_relative_path(name: &[u8]) -> Result<&Path> {
    let is_valid = !name.is_empty()
        && !name.starts_with(b"/")
        && !name.contains(&b'\\')
        && !name.split(|b| *b == b'/').any(|segment| segment == b"..");

    if !is_valid {
        return Err(ArchiveError::UnsafePath {
            name: String::from_utf8_lossy(name).into_owned(),
        });
    }
    Ok(Path::new(OsStr::from_bytes(name)))
}
