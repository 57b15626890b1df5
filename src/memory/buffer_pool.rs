//! Fixed-size byte buffer recycling.
//!
//! Large downloads and rendered article bodies reuse pooled buffers instead
//! of repeatedly allocating megabyte-sized blocks. Buffers are handed out as
//! RAII guards; dropping the guard returns the buffer to the pool.

use crate::config::BufferPoolConfig;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

struct PoolShared {
    chunk_size: usize,
    max_chunks: usize,
    idle: Mutex<Vec<Vec<u8>>>,
}

/// Pool of fixed-size byte buffers. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct ByteBufferPool {
    shared: Arc<PoolShared>,
}

impl ByteBufferPool {
    pub fn new(config: &BufferPoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                chunk_size: config.chunk_size,
                max_chunks: config.max_chunks,
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Pop an idle buffer or allocate a fresh `chunk_size` one. The guard
    /// returns the buffer when dropped.
    pub fn acquire(&self) -> PooledBuffer {
        let buffer = self
            .shared
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.shared.chunk_size]);
        PooledBuffer {
            buffer: Some(buffer),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.shared.chunk_size
    }

    /// Number of buffers currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.shared.idle.lock().len()
    }
}

/// RAII handle to a pooled buffer; dereferences to `Vec<u8>`.
pub struct PooledBuffer {
    buffer: Option<Vec<u8>>,
    shared: Arc<PoolShared>,
}

impl PooledBuffer {
    /// Take ownership of the buffer, keeping it out of the pool.
    pub fn detach(mut self) -> Vec<u8> {
        self.buffer.take().unwrap_or_default()
    }
}

static EMPTY_BUFFER: Vec<u8> = Vec::new();

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        self.buffer.as_ref().unwrap_or(&EMPTY_BUFFER)
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buffer.get_or_insert_with(Vec::new)
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let Some(buffer) = self.buffer.take() else {
            return;
        };
        let mut idle = self.shared.idle.lock();
        if idle.len() < self.shared.max_chunks {
            // A resized buffer is replaced with a fresh normalized chunk so
            // oversized blocks never linger in the pool
            if buffer.len() == self.shared.chunk_size {
                idle.push(buffer);
            } else {
                idle.push(vec![0u8; self.shared.chunk_size]);
            }
        }
    }
}
