//! Packing and unpacking of directory trees as gzip-compressed tar streams.
//!
//! The archive layout is a plain tar stream wrapped in gzip:
//!
//! ```sh
//! archive.tar.gz
//! ├── dir/            (directory entry, header only)
//! ├── dir/file.txt    (regular entry, header + payload)
//! └── other.bin
//! ```
//!
//! Only directories and regular files are supported. [`pack`] refuses to
//! archive anything else, and [`unpack`] refuses entry names that could resolve
//! outside of the destination directory.

mod error;
mod pack;
mod path;
mod unpack;

pub use error::{ArchiveError, Result};
pub use pack::{PackSummary, pack};
pub use path::checked_relative_path;
pub use unpack::{UnpackSummary, unpack};
