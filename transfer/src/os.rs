//! Filesystem operations used by transfers.

use crate::{callbacks::ProgressCallback, io::ReadFileChunk};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek};
use std::path::Path;
use strum::{Display, EnumString};

/// The mode in which to [open](OsUtils::open) a file.
///
/// Parses from the usual `fopen`-style mode strings. Files are always handled as bytes, so the
/// binary (`b`) and text forms of each mode are equivalent.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, EnumString)]
pub enum OpenMode {
    #[strum(serialize = "rb", serialize = "r")]
    Read,
    #[strum(serialize = "wb", serialize = "w")]
    Write,
    #[strum(serialize = "ab", serialize = "a")]
    Append,
}

impl OpenMode {
    fn options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            Self::Read => options.read(true),
            Self::Write => options.write(true).create(true).truncate(true),
            Self::Append => options.append(true).create(true),
        };
        options
    }
}

/// Filesystem operations performed on behalf of a transfer.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsUtils;

impl OsUtils {
    pub fn get_file_size(&self, path: impl AsRef<Path>) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    /// Open a chunk of the file at `path`, for uploading as one part of a multipart upload.
    ///
    /// Callbacks start out disabled: the chunk is read once to compute its checksum before it is
    /// sent, and only the read that sends the data should count as progress.
    pub fn open_file_chunk_reader(
        &self,
        path: impl AsRef<Path>,
        start_byte: u64,
        size: u64,
        callbacks: Vec<ProgressCallback>,
    ) -> io::Result<ReadFileChunk<File>> {
        ReadFileChunk::from_filename(path, start_byte, size, callbacks, false)
    }

    /// Open a chunk of an already open stream, starting at its current position.
    ///
    /// Callbacks start out disabled, as with [`open_file_chunk_reader`](Self::open_file_chunk_reader).
    pub fn open_file_chunk_reader_from_fileobj<R: Read + Seek>(
        &self,
        fileobj: R,
        chunk_size: u64,
        full_file_size: u64,
        callbacks: Vec<ProgressCallback>,
    ) -> io::Result<ReadFileChunk<R>> {
        ReadFileChunk::new(fileobj, chunk_size, full_file_size, callbacks, false)
    }

    pub fn open(&self, path: impl AsRef<Path>, mode: OpenMode) -> io::Result<File> {
        mode.options().open(path)
    }

    /// Remove a file.
    ///
    /// Does nothing if the file does not exist or cannot be removed.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if let Err(err) = fs::remove_file(path) {
            tracing::debug!("not removing {}: {err}", path.display());
        }
    }

    /// Rename a file, replacing `new_path` if it already exists.
    pub fn rename_file(
        &self,
        current_path: impl AsRef<Path>,
        new_path: impl AsRef<Path>,
    ) -> io::Result<()> {
        fs::rename(current_path, new_path)
    }
}
