use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use crate::types::error::DatabaseError;

/// Byte-addressed store underneath the pager.
///
/// Reads take `&self` so that concurrent readers can share the pager; writes
/// only happen on commit, under the database's exclusive lock.
pub trait BackingStore: Send + Sync {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), DatabaseError>;
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), DatabaseError>;
    fn len(&self) -> Result<u64, DatabaseError>;
    fn sync(&mut self) -> Result<(), DatabaseError>;
    fn describe(&self) -> String;
}

pub struct FileStore {
    path: PathBuf,
    // Seek + read must not interleave between readers
    file: Mutex<File>,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackingStore for FileStore {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), DatabaseError> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), DatabaseError> {
        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn len(&self) -> Result<u64, DatabaseError> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn sync(&mut self) -> Result<(), DatabaseError> {
        let file = self.file.get_mut();
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Growable in-memory buffer, discarded when the database is closed.
#[derive(Default)]
pub struct MemoryStore {
    data: Vec<u8>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackingStore for MemoryStore {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), DatabaseError> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(DatabaseError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("read of {} bytes at {} past end of memory store", buf.len(), offset),
            )));
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), DatabaseError> {
        let start = offset as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn len(&self) -> Result<u64, DatabaseError> {
        Ok(self.data.len() as u64)
    }

    fn sync(&mut self) -> Result<(), DatabaseError> {
        Ok(())
    }

    fn describe(&self) -> String {
        ":memory:".to_string()
    }
}
