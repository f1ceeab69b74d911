//! Readers over files and streams which report transfer progress.

use crate::callbacks::{invoke_progress_callbacks, ProgressCallback, ToggleCallbacks};
use std::cmp::min;
use std::fmt::{self, Debug, Formatter};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A function used to open a file for reading.
pub type Opener = Box<dyn Fn(&Path) -> io::Result<File> + Send + Sync>;

/// A file which is not opened until it is needed.
///
/// Most operating systems limit how many files a process can have open at once. Transfers of many
/// files create one of these per file up front and only open the file when a worker actually
/// starts reading it, either by reading, seeking, or calling [`open`](Self::open).
pub struct DeferredOpenFile {
    path: PathBuf,
    start_byte: u64,
    file: Option<File>,
    opener: Opener,
}

impl DeferredOpenFile {
    /// Prepare to open `path`, starting from `start_byte`.
    pub fn new(path: impl Into<PathBuf>, start_byte: u64) -> Self {
        Self {
            path: path.into(),
            start_byte,
            file: None,
            opener: Box::new(|path: &Path| File::open(path)),
        }
    }

    /// Use `opener` instead of [`File::open`] when the file is eventually opened.
    pub fn with_opener(
        mut self,
        opener: impl Fn(&Path) -> io::Result<File> + Send + Sync + 'static,
    ) -> Self {
        self.opener = Box::new(opener);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Open the file, if it is not open already, and position it at the start byte.
    pub fn open(&mut self) -> io::Result<&mut File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                tracing::debug!("opening {}", self.path.display());
                let mut file = (self.opener)(&self.path)?;
                file.seek(SeekFrom::Start(self.start_byte))?;
                file
            }
        };
        Ok(self.file.insert(file))
    }

    /// The current position in the file.
    ///
    /// This does not open the file: until then the position is the start byte.
    pub fn tell(&mut self) -> io::Result<u64> {
        match &mut self.file {
            Some(file) => file.stream_position(),
            None => Ok(self.start_byte),
        }
    }

    /// Close the file, if it is open.
    pub fn close(&mut self) {
        self.file = None;
    }
}

impl Read for DeferredOpenFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.open()?.read(buf)
    }
}

impl Seek for DeferredOpenFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.open()?.seek(pos)
    }
}

impl Debug for DeferredOpenFile {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("DeferredOpenFile")
            .field("path", &self.path)
            .field("start_byte", &self.start_byte)
            .field("open", &self.is_open())
            .finish()
    }
}

/// A window onto part of a file.
///
/// Given a stream positioned at `start` when the chunk is created:
///
/// ```text
///     |___________________________________________________|
///     0          |                 |                 full_file_size
///                |----chunk_size---|
///              start
/// ```
///
/// the chunk behaves like a file containing only the bytes between `start` and
/// `start + chunk_size`, or the end of the file if that comes first. Reading past the end of the
/// chunk behaves like reading at the end of a file. Positions, as used by [`Seek`] and
/// [`tell`](Self::tell), are relative to `start`.
///
/// Every read reports the number of bytes read to the progress callbacks, and every seek reports
/// the distance moved (negative when seeking backwards), so that the progress of a retried upload
/// is rewound and replayed correctly.
pub struct ReadFileChunk<R> {
    inner: R,
    start_byte: u64,
    size: u64,
    amount_read: u64,
    callbacks: Vec<ProgressCallback>,
    callbacks_enabled: bool,
}

impl ReadFileChunk<File> {
    /// Open `path` and create a chunk starting at `start_byte`.
    pub fn from_filename(
        path: impl AsRef<Path>,
        start_byte: u64,
        chunk_size: u64,
        callbacks: Vec<ProgressCallback>,
        enable_callbacks: bool,
    ) -> io::Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start_byte))?;
        let file_size = file.metadata()?.len();
        Self::new(file, chunk_size, file_size, callbacks, enable_callbacks)
    }
}

impl<R: Read + Seek> ReadFileChunk<R> {
    /// Create a chunk of at most `chunk_size` bytes, starting at the current position of `inner`.
    ///
    /// `full_file_size` is the total length of the content behind `inner`.
    pub fn new(
        mut inner: R,
        chunk_size: u64,
        full_file_size: u64,
        callbacks: Vec<ProgressCallback>,
        enable_callbacks: bool,
    ) -> io::Result<Self> {
        let start_byte = inner.stream_position()?;
        Ok(Self {
            inner,
            start_byte,
            size: min(full_file_size.saturating_sub(start_byte), chunk_size),
            amount_read: 0,
            callbacks,
            callbacks_enabled: enable_callbacks,
        })
    }

    /// Read up to `amount` bytes, or the rest of the chunk if `amount` is [`None`].
    ///
    /// Unlike [`Read::read`], this only returns fewer bytes than requested when the end of the
    /// chunk (or the underlying file) is reached.
    pub fn read_amount(&mut self, amount: Option<u64>) -> io::Result<Vec<u8>> {
        let remaining = self.remaining();
        let amount = amount.map_or(remaining, |amount| min(amount, remaining));
        let mut data = Vec::new();
        self.inner.by_ref().take(amount).read_to_end(&mut data)?;
        self.record_read(data.len());
        Ok(data)
    }

    fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.amount_read)
    }

    fn record_read(&mut self, amount: usize) {
        self.amount_read += amount as u64;
        if self.callbacks_enabled {
            invoke_progress_callbacks(&self.callbacks, amount as i64);
        }
    }
}

impl<R> ReadFileChunk<R> {
    /// The number of bytes in this chunk.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The current position within the chunk.
    pub fn tell(&self) -> u64 {
        self.amount_read
    }

    /// Close the chunk, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for ReadFileChunk<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = min(buf.len() as u64, self.remaining()) as usize;
        let amount = self.inner.read(&mut buf[..len])?;
        self.record_read(amount);
        Ok(amount)
    }
}

impl<R: Read + Seek> Seek for ReadFileChunk<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.amount_read.checked_add_signed(delta),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
        }
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;

        self.inner.seek(SeekFrom::Start(self.start_byte + target))?;
        if self.callbacks_enabled {
            // Rewind (or fast forward) progress by the distance moved.
            invoke_progress_callbacks(
                &self.callbacks,
                target as i64 - self.amount_read as i64,
            );
        }
        self.amount_read = target;
        Ok(target)
    }
}

impl<R> ToggleCallbacks for ReadFileChunk<R> {
    fn enable_callback(&mut self) {
        self.callbacks_enabled = true;
    }

    fn disable_callback(&mut self) {
        self.callbacks_enabled = false;
    }
}

impl<R> Debug for ReadFileChunk<R> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("ReadFileChunk")
            .field("start_byte", &self.start_byte)
            .field("size", &self.size)
            .field("amount_read", &self.amount_read)
            .field("callbacks", &self.callbacks.len())
            .field("callbacks_enabled", &self.callbacks_enabled)
            .finish()
    }
}

/// A read-only stream which reports the number of bytes read to progress callbacks.
pub struct StreamReaderProgress<R> {
    stream: R,
    callbacks: Vec<ProgressCallback>,
}

impl<R> StreamReaderProgress<R> {
    pub fn new(stream: R, callbacks: Vec<ProgressCallback>) -> Self {
        Self { stream, callbacks }
    }

    pub fn into_inner(self) -> R {
        self.stream
    }
}

impl<R: Read> Read for StreamReaderProgress<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let amount = self.stream.read(buf)?;
        invoke_progress_callbacks(&self.callbacks, amount as i64);
        Ok(amount)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Cursor, Write};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use tempfile::TempDir;

    const CONTENTS: &[u8] = b"onetwothreefourfivesixseveneightnineten";

    fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        File::create(&path).unwrap().write_all(contents).unwrap();
        path
    }

    /// A progress callback which records every amount it is called with.
    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<i64>>>) {
        let seen = Arc::new(Mutex::new(vec![]));
        let callback: ProgressCallback = {
            let seen = seen.clone();
            Arc::new(move |amount: i64| seen.lock().unwrap().push(amount))
        };
        (callback, seen)
    }

    fn counting_file(path: &Path) -> (DeferredOpenFile, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let file = DeferredOpenFile::new(path, 0).with_opener({
            let opens = opens.clone();
            move |path| {
                opens.fetch_add(1, Ordering::SeqCst);
                File::open(path)
            }
        });
        (file, opens)
    }

    #[test]
    fn test_deferred_instantiation_does_not_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", b"my contents");
        let (file, opens) = counting_file(&path);
        assert!(!file.is_open());
        assert_eq!(opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_deferred_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", b"my contents");
        let (mut file, opens) = counting_file(&path);

        let mut buf = [0; 2];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"my");
        file.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b" c");
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_seek() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", b"my contents");
        let (mut file, opens) = counting_file(&path);

        file.seek(SeekFrom::Start(2)).unwrap();
        let mut buf = [0; 2];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b" c");
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_tell() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", b"my contents");
        let (mut file, opens) = counting_file(&path);

        // The start byte is known up front, so there is no need to open the file.
        assert_eq!(file.tell().unwrap(), 0);
        assert_eq!(opens.load(Ordering::SeqCst), 0);

        file.seek(SeekFrom::Start(2)).unwrap();
        assert_eq!(file.tell().unwrap(), 2);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_start_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", b"my contents");
        let mut file = DeferredOpenFile::new(&path, 3);
        assert_eq!(file.tell().unwrap(), 3);

        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "contents");
    }

    #[test]
    fn test_deferred_open_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", b"my contents");
        let (mut file, opens) = counting_file(&path);

        file.open().unwrap();
        file.open().unwrap();
        assert!(file.is_open());
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        file.close();
        assert!(!file.is_open());
    }

    #[test]
    fn test_read_entire_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", CONTENTS);
        let mut chunk = ReadFileChunk::from_filename(&path, 0, 3, vec![], true).unwrap();
        assert_eq!(chunk.read_amount(None).unwrap(), b"one");
        assert_eq!(chunk.read_amount(None).unwrap(), b"");
    }

    #[test]
    fn test_read_with_amount_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", CONTENTS);
        let mut chunk = ReadFileChunk::from_filename(&path, 11, 4, vec![], true).unwrap();
        assert_eq!(chunk.read_amount(Some(1)).unwrap(), b"f");
        assert_eq!(chunk.read_amount(Some(1)).unwrap(), b"o");
        assert_eq!(chunk.read_amount(Some(1)).unwrap(), b"u");
        assert_eq!(chunk.read_amount(Some(1)).unwrap(), b"r");
        assert_eq!(chunk.read_amount(Some(1)).unwrap(), b"");
    }

    #[test]
    fn test_reset_stream_emulation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", CONTENTS);
        let mut chunk = ReadFileChunk::from_filename(&path, 11, 4, vec![], true).unwrap();
        assert_eq!(chunk.read_amount(None).unwrap(), b"four");
        chunk.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(chunk.read_amount(None).unwrap(), b"four");
    }

    #[test]
    fn test_read_past_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", CONTENTS);
        let mut chunk = ReadFileChunk::from_filename(&path, 36, 100000, vec![], true).unwrap();
        assert_eq!(chunk.read_amount(None).unwrap(), b"ten");
        assert_eq!(chunk.read_amount(None).unwrap(), b"");
        assert_eq!(chunk.len(), 3);
    }

    #[test]
    fn test_tell_and_seek() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", CONTENTS);
        let mut chunk = ReadFileChunk::from_filename(&path, 36, 100000, vec![], true).unwrap();
        assert_eq!(chunk.tell(), 0);
        assert_eq!(chunk.read_amount(None).unwrap(), b"ten");
        assert_eq!(chunk.tell(), 3);
        chunk.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(chunk.tell(), 0);
        assert_eq!(chunk.seek(SeekFrom::End(-1)).unwrap(), 2);
        assert_eq!(chunk.read_amount(None).unwrap(), b"n");
    }

    #[test]
    fn test_seek_before_start_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", CONTENTS);
        let mut chunk = ReadFileChunk::from_filename(&path, 3, 3, vec![], true).unwrap();
        let err = chunk.seek(SeekFrom::Current(-1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(chunk.tell(), 0);
    }

    #[test]
    fn test_std_read_is_limited_to_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", b"abc");
        let mut chunk = ReadFileChunk::from_filename(&path, 0, 2, vec![], true).unwrap();
        let mut contents = vec![];
        chunk.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"ab");
    }

    #[test]
    fn test_chunk_from_stream() {
        let mut stream = Cursor::new(CONTENTS.to_vec());
        stream.seek(SeekFrom::Start(3)).unwrap();
        let mut chunk =
            ReadFileChunk::new(stream, 3, CONTENTS.len() as u64, vec![], true).unwrap();
        assert_eq!(chunk.read_amount(None).unwrap(), b"two");
        assert_eq!(chunk.into_inner().position(), 6);
    }

    #[test]
    fn test_callback_is_invoked_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", b"abc");
        let (callback, seen) = recorder();
        let mut chunk = ReadFileChunk::from_filename(&path, 0, 3, vec![callback], true).unwrap();
        chunk.read_amount(Some(1)).unwrap();
        chunk.read_amount(Some(1)).unwrap();
        chunk.read_amount(Some(1)).unwrap();
        assert_eq!(*seen.lock().unwrap(), [1, 1, 1]);
    }

    #[test]
    fn test_all_callbacks_invoked_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", b"abc");
        let (callback, seen) = recorder();
        let mut chunk =
            ReadFileChunk::from_filename(&path, 0, 3, vec![callback.clone(), callback], true)
                .unwrap();
        chunk.read_amount(Some(1)).unwrap();
        chunk.read_amount(Some(1)).unwrap();
        chunk.read_amount(Some(1)).unwrap();
        // Both callbacks record into the same list.
        assert_eq!(*seen.lock().unwrap(), [1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_callback_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", b"abc");
        let (callback, seen) = recorder();
        let mut chunk = ReadFileChunk::from_filename(&path, 0, 3, vec![callback], true).unwrap();
        chunk.disable_callback();
        chunk.read_amount(None).unwrap();
        assert!(seen.lock().unwrap().is_empty());

        chunk.enable_callback();
        chunk.seek(SeekFrom::Start(1)).unwrap();
        assert_eq!(*seen.lock().unwrap(), [-2]);
    }

    #[test]
    fn test_callback_will_also_be_triggered_by_seek() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "foo", b"abc");
        let (callback, seen) = recorder();
        let mut chunk = ReadFileChunk::from_filename(&path, 0, 3, vec![callback], true).unwrap();
        chunk.read_amount(Some(2)).unwrap();
        chunk.seek(SeekFrom::Start(0)).unwrap();
        chunk.read_amount(Some(2)).unwrap();
        chunk.seek(SeekFrom::Start(1)).unwrap();
        chunk.read_amount(Some(2)).unwrap();
        assert_eq!(*seen.lock().unwrap(), [2, -2, 2, -1, 2]);
    }

    #[test]
    fn test_stream_reader_proxies_to_wrapped_stream() {
        let mut wrapped = StreamReaderProgress::new(Cursor::new("foobarbaz"), vec![]);
        let mut contents = String::new();
        wrapped.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "foobarbaz");
    }

    #[test]
    fn test_stream_reader_callback_invoked() {
        let (callback, seen) = recorder();
        let mut wrapped =
            StreamReaderProgress::new(Cursor::new("foobarbaz"), vec![callback.clone(), callback]);
        let mut contents = String::new();
        wrapped.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "foobarbaz");

        // Each callback sees every byte, and the final empty read reports nothing.
        let seen = seen.lock().unwrap();
        assert_eq!(seen.iter().sum::<i64>(), 18);
        assert!(seen.iter().all(|amount| *amount > 0));
    }
}
