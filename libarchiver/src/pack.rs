use std::{
    fs::{self, File, FileType, Metadata},
    io::{self, BufReader, Read, Write},
    os::unix::fs::FileTypeExt,
    path::Path,
};

use flate2::{Compression, write::GzEncoder};
use tar::{Builder, EntryType, Header, HeaderMode};
use walkdir::WalkDir;

use crate::error::{ArchiveError, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PackSummary {
    /// Number of directory and file entries written.
    pub entries: u64,
}

/// Pack `source` into a tar.gz stream written to `writer`.
///
/// A regular file becomes a single entry named after its base name. A
/// directory is walked recursively and every entry is named relative to
/// `source`; the root itself is not stored. Any other file type found on the
/// way aborts the walk.
///
/// The writer is handed back once the gzip trailer has been written.
pub fn pack<W: Write>(source: impl AsRef<Path>, writer: W) -> Result<(W, PackSummary)> {
    let source = source.as_ref();
    let metadata = fs::metadata(source).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => ArchiveError::SourceMissing {
            path: source.to_path_buf(),
        },
        _ => ArchiveError::Io {
            path: source.to_path_buf(),
            source: err,
        },
    })?;

    let mut builder = Builder::new(GzEncoder::new(writer, Compression::default()));
    let mut summary = PackSummary::default();

    if metadata.is_file() {
        let name = source
            .file_name()
            .ok_or_else(|| ArchiveError::UnsupportedFileType {
                path: source.to_path_buf(),
                kind: "unnamed file",
            })?;
        append_file(&mut builder, source, Path::new(name), &metadata)?;
        summary.entries += 1;
    } else if metadata.is_dir() {
        summary.entries = append_tree(&mut builder, source)?;
    } else {
        tracing::error!("File type not supported: {}", source.display());
        return Err(ArchiveError::UnsupportedFileType {
            path: source.to_path_buf(),
            kind: describe(&metadata.file_type()),
        });
    }

    let encoder = builder.into_inner().map_err(ArchiveError::io(source))?;
    let writer = encoder.finish().map_err(ArchiveError::io(source))?;

    tracing::debug!(
        "Packed {} entries from {}",
        summary.entries,
        source.display()
    );
    Ok((writer, summary))
}

fn append_tree<W: Write>(builder: &mut Builder<W>, root: &Path) -> Result<u64> {
    let mut entries = 0;
    for entry_result in WalkDir::new(root).follow_links(false) {
        let entry = entry_result.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            ArchiveError::Io {
                path,
                source: err.into(),
            }
        })?;

        let path = entry.path();
        // walkdir only yields paths below the root it was given
        let relative_path = match path.strip_prefix(root) {
            Ok(rel_path) => rel_path,
            Err(_) => continue,
        };
        if relative_path.as_os_str().is_empty() {
            continue;
        }

        let metadata = entry.metadata().map_err(|err| ArchiveError::Io {
            path: path.to_path_buf(),
            source: err.into(),
        })?;
        let file_type = metadata.file_type();
        if file_type.is_dir() {
            append_dir(builder, path, relative_path, &metadata)?;
        } else if file_type.is_file() {
            append_file(builder, path, relative_path, &metadata)?;
        } else {
            tracing::error!("File type not supported: {}", path.display());
            return Err(ArchiveError::UnsupportedFileType {
                path: path.to_path_buf(),
                kind: describe(&file_type),
            });
        }
        entries += 1;
    }
    Ok(entries)
}

/// Add regular file
fn append_file<W: Write>(
    builder: &mut Builder<W>,
    path: &Path,
    name: &Path,
    metadata: &Metadata,
) -> Result<()> {
    let file = File::open(path).map_err(ArchiveError::io(path))?;
    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(metadata, HeaderMode::Complete);
    header.set_entry_type(EntryType::Regular);
    header.set_size(metadata.len());

    append_sized(builder, &mut header, name, BufReader::new(file), metadata.len())
        .map_err(ArchiveError::io(path))
}

/// Append an entry whose payload must be exactly `len` bytes long.
///
/// The header size is authoritative: a longer source is cut off, a shorter one
/// fails the entry instead of leaving a truncated payload in the stream.
fn append_sized<W: Write, R: Read>(
    builder: &mut Builder<W>,
    header: &mut Header,
    name: &Path,
    reader: R,
    len: u64,
) -> io::Result<()> {
    let reader = SizedReader {
        inner: reader,
        remaining: len,
    };
    builder.append_data(header, name, reader)
}

struct SizedReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> Read for SizedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = usize::try_from(self.remaining).map_or(buf.len(), |rest| rest.min(buf.len()));
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shrank, {} bytes missing", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Add directory
fn append_dir<W: Write>(
    builder: &mut Builder<W>,
    path: &Path,
    name: &Path,
    metadata: &Metadata,
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(metadata, HeaderMode::Complete);
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);

    builder
        .append_data(&mut header, name, io::empty())
        .map_err(ArchiveError::io(path))
}

fn describe(file_type: &FileType) -> &'static str {
    if file_type.is_symlink() {
        "symlink"
    } else if file_type.is_block_device() {
        "block device"
    } else if file_type.is_char_device() {
        "character device"
    } else if file_type.is_fifo() {
        "fifo"
    } else if file_type.is_socket() {
        "socket"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Cursor, os::unix::fs::symlink};

    use flate2::read::GzDecoder;
    use tar::Archive;
    use tempfile::tempdir;

    use super::*;

    fn entry_names(archive: &[u8]) -> Vec<(String, EntryType)> {
        let mut archive = Archive::new(GzDecoder::new(Cursor::new(archive)));
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                (name, entry.header().entry_type())
            })
            .collect()
    }

    #[test]
    fn test_pack_single_file() {
        let tmp_dir = tempdir().unwrap();
        let file = tmp_dir.path().join("file.txt");
        fs::write(&file, "Hello, world!").unwrap();

        let (buf, summary) = pack(&file, Vec::new()).unwrap();

        assert_eq!(summary.entries, 1);
        assert_eq!(
            entry_names(&buf),
            vec![("file.txt".to_string(), EntryType::Regular)]
        );
    }

    #[test]
    fn test_pack_directory_parents_first() {
        let tmp_dir = tempdir().unwrap();
        let root = tmp_dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/b/c.txt"), "c").unwrap();
        fs::write(root.join("top.txt"), "top").unwrap();

        let (buf, summary) = pack(root, Vec::new()).unwrap();
        let names = entry_names(&buf);

        assert_eq!(summary.entries, 4);
        assert_eq!(names.len(), 4);
        let position = |wanted: &str| {
            names
                .iter()
                .position(|(name, _)| name.trim_end_matches('/') == wanted)
                .unwrap()
        };
        assert!(position("a") < position("a/b"));
        assert!(position("a/b") < position("a/b/c.txt"));
        assert!(names.iter().all(|(name, _)| !name.starts_with('/')));
    }

    #[test]
    fn test_pack_missing_source() {
        let tmp_dir = tempdir().unwrap();
        let err = pack(tmp_dir.path().join("missing"), Vec::new()).unwrap_err();
        assert!(matches!(err, ArchiveError::SourceMissing { .. }));
    }

    #[test]
    fn test_pack_rejects_symlink() {
        let tmp_dir = tempdir().unwrap();
        let root = tmp_dir.path();
        fs::write(root.join("target.txt"), "data").unwrap();
        symlink(root.join("target.txt"), root.join("link")).unwrap();

        let err = pack(root, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::UnsupportedFileType {
                kind: "symlink",
                ..
            }
        ));
    }

    fn sized_header(len: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(len);
        header
    }

    #[test]
    fn test_short_payload_fails_entry() {
        let mut builder = Builder::new(Vec::new());
        let mut header = sized_header(1024);

        let err = append_sized(
            &mut builder,
            &mut header,
            Path::new("shrunk.log"),
            Cursor::new(vec![b'x'; 100]),
            1024,
        )
        .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_long_payload_is_cut_to_header_size() {
        let mut builder = Builder::new(Vec::new());
        let mut header = sized_header(4);
        append_sized(
            &mut builder,
            &mut header,
            Path::new("grown.log"),
            Cursor::new(b"abcdefgh".to_vec()),
            4,
        )
        .unwrap();
        let tar = builder.into_inner().unwrap();

        let mut archive = Archive::new(Cursor::new(tar));
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "abcd");
        drop(entry);
        assert!(entries.next().is_none());
    }

    #[test]
    fn test_pack_propagates_writer_failure() {
        #[derive(Debug)]
        struct BrokenWriter;

        impl Write for BrokenWriter {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let tmp_dir = tempdir().unwrap();
        // large enough to force the encoder to flush into the writer
        let content: Vec<u8> = (0..4 * 1024 * 1024u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8)
            .collect();
        fs::write(tmp_dir.path().join("big.bin"), content).unwrap();

        let err = pack(tmp_dir.path(), BrokenWriter).unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
    }
}
