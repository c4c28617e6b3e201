use std::ops::Range;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use crate::{ChunkError, DEFAULT_CHUNK_SIZE};

// ---------------------------------------------------------------------------
// ChunkPlan
// ---------------------------------------------------------------------------

/// Fixed chunk layout of one file, decided at transfer start.
///
/// `total` is `ceil(file_size / chunk_size)` with a minimum of 1, so an
/// empty file still travels as one (empty) chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: usize,
    total: u32,
}

impl ChunkPlan {
    /// Plans `file_size` bytes in chunks of `chunk_size`.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (750 KiB) is used.
    pub fn new(file_size: u64, chunk_size: usize) -> Result<Self, ChunkError> {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let total = file_size.div_ceil(chunk_size as u64).max(1);
        let total = u32::try_from(total).map_err(|_| ChunkError::TooManyChunks(total))?;
        Ok(Self {
            file_size,
            chunk_size,
            total,
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Byte range `[index*chunk_size, min(file_size, (index+1)*chunk_size))`.
    pub fn range(&self, index: u32) -> Result<Range<u64>, ChunkError> {
        if index >= self.total {
            return Err(ChunkError::OutOfRange {
                index,
                total: self.total,
            });
        }
        let start = u64::from(index) * self.chunk_size as u64;
        let end = (start + self.chunk_size as u64).min(self.file_size);
        Ok(start.min(end)..end)
    }

    /// Returns `true` if `index` is the final chunk.
    pub fn is_last(&self, index: u32) -> bool {
        index.checked_add(1) == Some(self.total)
    }
}

// ---------------------------------------------------------------------------
// ChunkSource
// ---------------------------------------------------------------------------

enum Backing {
    File(tokio::fs::File),
    Memory(Vec<u8>),
}

/// Random-access byte source an upload slices chunks from.
///
/// File-backed sources read one chunk at a time, so only the chunk being
/// sealed is ever held in memory.
pub struct ChunkSource {
    backing: Backing,
    size: u64,
}

impl std::fmt::Debug for ChunkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.backing {
            Backing::File(_) => "file",
            Backing::Memory(_) => "memory",
        };
        f.debug_struct("ChunkSource")
            .field("backing", &kind)
            .field("size", &self.size)
            .finish()
    }
}

impl ChunkSource {
    /// Opens `path` for chunked reading.
    pub async fn open(path: &Path) -> Result<Self, ChunkError> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok(Self {
            backing: Backing::File(file),
            size,
        })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        Self {
            backing: Backing::Memory(bytes),
            size,
        }
    }

    /// Source length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads the plaintext of chunk `index`.
    pub async fn read_chunk(&mut self, plan: &ChunkPlan, index: u32) -> Result<Vec<u8>, ChunkError> {
        let range = plan.range(index)?;
        let len = (range.end - range.start) as usize;
        match &mut self.backing {
            Backing::File(file) => {
                let mut buf = vec![0u8; len];
                file.seek(SeekFrom::Start(range.start)).await?;
                file.read_exact(&mut buf).await?;
                Ok(buf)
            }
            Backing::Memory(bytes) => {
                let start = range.start as usize;
                let end = range.end as usize;
                bytes
                    .get(start..end)
                    .map(<[u8]>::to_vec)
                    .ok_or(ChunkError::OutOfRange {
                        index,
                        total: plan.total(),
                    })
            }
        }
    }
}
