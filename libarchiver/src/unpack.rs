use std::{
    fs::{self, OpenOptions, Permissions},
    io::{self, BufRead, BufReader, Read},
    os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt},
    path::{Path, PathBuf},
};

use flate2::bufread::GzDecoder;
use tar::{Archive, EntryType};

use crate::{
    error::{ArchiveError, Result},
    path::checked_relative_path,
};

const DEFAULT_DIR_MODE: u32 = 0o755;
const PERMISSION_BITS: u32 = 0o7777;
const OWNER_RW: u32 = 0o600;
const OWNER_RWX: u32 = 0o700;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Number of directory and file entries materialized.
    pub entries: u64,
    /// Payload bytes written to regular files.
    pub bytes: u64,
}

/// Unpack a tar.gz stream into `destination`, creating it when missing.
///
/// An empty stream is a valid archive with no entries. Entry names are checked
/// with [`checked_relative_path`] before anything is written for them; the
/// first invalid name aborts the extraction and leaves the entries already
/// written in place.
///
/// Each destination file is closed before the next entry is read.
pub fn unpack<R: Read>(reader: R, destination: impl AsRef<Path>) -> Result<UnpackSummary> {
    let destination = destination.as_ref();
    if !destination.exists() {
        create_dir(destination)?;
        tracing::info!("Create directory {} succeeded.", destination.display());
    }

    let mut input = BufReader::new(reader);
    if input.fill_buf().map_err(ArchiveError::Stream)?.is_empty() {
        tracing::info!("The source stream is empty, nothing to extract");
        return Ok(UnpackSummary::default());
    }

    let mut archive = Archive::new(GzDecoder::new(input));
    let mut summary = UnpackSummary::default();
    // applied once every child is in place
    let mut dir_modes: Vec<(PathBuf, u32)> = Vec::new();

    for entry_result in archive.entries().map_err(ArchiveError::Stream)? {
        let mut entry = entry_result.map_err(ArchiveError::Stream)?;

        let name = entry.path_bytes().into_owned();
        let relative_path = checked_relative_path(&name).inspect_err(|err| {
            tracing::error!("{err}");
        })?;
        let target = destination.join(relative_path);
        let mode = entry
            .header()
            .mode()
            .map_err(ArchiveError::Stream)?
            & PERMISSION_BITS;

        match entry.header().entry_type() {
            EntryType::Directory => {
                create_dir(&target)?;
                dir_modes.push((target, mode));
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    create_dir(parent)?;
                }
                summary.bytes += write_file(&mut entry, &target, mode)?;
            }
            other => {
                tracing::warn!(
                    "Skip unsupported entry type {:?}: {}",
                    other,
                    target.display()
                );
                continue;
            }
        }
        summary.entries += 1;
    }

    for (dir, mode) in dir_modes.iter().rev() {
        fs::set_permissions(dir, Permissions::from_mode(*mode)).map_err(ArchiveError::io(dir))?;
    }

    tracing::debug!(
        "Unpacked {} entries ({} bytes) into {}",
        summary.entries,
        summary.bytes,
        destination.display()
    );
    Ok(summary)
}

fn create_dir(path: &Path) -> Result<()> {
    in_writable_parent(path, || {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(DEFAULT_DIR_MODE)
            .create(path)
    })
}

/// Write one regular entry. The file handle is dropped before returning.
fn write_file<R: Read>(entry: &mut R, target: &Path, mode: u32) -> Result<u64> {
    match fs::symlink_metadata(target) {
        // a read-only file left by an earlier restore is rewritten in place
        Ok(existing) if existing.is_file() => {
            let writable = existing.permissions().mode() | OWNER_RW;
            fs::set_permissions(target, Permissions::from_mode(writable))
                .map_err(ArchiveError::io(target))?;
        }
        // never write through a symlink or special file
        Ok(existing) if !existing.is_dir() => {
            in_writable_parent(target, || fs::remove_file(target))?;
        }
        _ => {}
    }

    let mut file = in_writable_parent(target, || {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(target)
    })?;
    let written = io::copy(entry, &mut file).map_err(ArchiveError::io(target))?;
    // the creation mode is filtered by the umask
    file.set_permissions(Permissions::from_mode(mode))
        .map_err(ArchiveError::io(target))?;
    Ok(written)
}

/// Run `op` on `target`, retrying once with owner access granted on the parent
/// directory when it is refused. Archived directory modes are reapplied after
/// the last entry.
fn in_writable_parent<T>(target: &Path, op: impl Fn() -> io::Result<T>) -> Result<T> {
    let err = match op() {
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => err,
        res => return res.map_err(ArchiveError::io(target)),
    };
    let Some(parent) = target.parent() else {
        return Err(ArchiveError::io(target)(err));
    };
    let current = fs::metadata(parent)
        .map_err(ArchiveError::io(parent))?
        .permissions()
        .mode();
    if current & OWNER_RWX == OWNER_RWX {
        return Err(ArchiveError::io(target)(err));
    }
    tracing::debug!(
        "Grant owner access on {} to write {}",
        parent.display(),
        target.display()
    );
    fs::set_permissions(parent, Permissions::from_mode(current | OWNER_RWX))
        .map_err(ArchiveError::io(parent))?;
    op().map_err(ArchiveError::io(target))
}
