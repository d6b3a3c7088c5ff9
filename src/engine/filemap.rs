use std::io::{Read, Seek, SeekFrom};

use crate::common::*;
use crate::value::FileMap;

/// Opens the file behind a file-backed value. Swappable so the executor can
/// route associated variables through its own I/O layer.
pub trait FileProvider: Debug {
    fn open_for_subscript(&self, map: &FileMap) -> CoreResult<Box<dyn FileHandle>>;
}

/// An open file-backed source. `seek_read` fills `buf` from absolute byte
/// offset `offset`.
pub trait FileHandle {
    fn seek_read(&mut self, offset: u64, buf: &mut [u8]) -> CoreResult<()>;
    fn close(&mut self) {}
}

/// Plain `std::fs` backed provider.
#[derive(Debug, Default, Copy, Clone)]
pub struct StdFileProvider;

struct StdFileHandle {
    file: Option<std::fs::File>,
}

impl FileProvider for StdFileProvider {
    fn open_for_subscript(&self, map: &FileMap) -> CoreResult<Box<dyn FileHandle>> {
        let file = std::fs::File::open(&map.path).map_err(|e| CoreError::io_at(e, map.offset))?;
        Ok(Box::new(StdFileHandle { file: Some(file) }))
    }
}

impl FileHandle for StdFileHandle {
    fn seek_read(&mut self, offset: u64, buf: &mut [u8]) -> CoreResult<()> {
        let file = self.file.as_mut().ok_or(CoreError::IoFailure {
            kind: std::io::ErrorKind::NotConnected,
            offset,
            message: "file map already closed".to_string(),
        })?;
        file.seek(SeekFrom::Start(offset)).map_err(|e| CoreError::io_at(e, offset))?;
        file.read_exact(buf).map_err(|e| CoreError::io_at(e, offset))
    }

    fn close(&mut self) {
        self.file = None;
    }
}

/// Keeps a handle open for the duration of one extraction and closes it on
/// every exit path.
pub(crate) struct FileGuard {
    handle: Box<dyn FileHandle>,
    base: u64,
    tag: TypeTag,
}

impl FileGuard {
    pub(crate) fn open(provider: &dyn FileProvider, map: &FileMap, logger: &mut dyn Logger) -> CoreResult<Self> {
        let handle = provider.open_for_subscript(map)?;
        log!(logger, "opened file map {:?}", map.path);
        Ok(Self { handle, base: map.offset, tag: map.tag })
    }

    /// Reads element `index` of the mapped array into `buf`.
    pub(crate) fn read_element(&mut self, index: usize, buf: &mut [u8]) -> CoreResult<()> {
        let size = self.tag.size();
        let offset = self.base + (index * size) as u64;
        self.handle.seek_read(offset, &mut buf[..size])
    }
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        self.handle.close();
    }
}
