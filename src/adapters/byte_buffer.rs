use super::*;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct ByteBufferInput {
    bytes: Vec<u8>,
    cursor: u64,
}

impl BaseAdapterHandler<Input, ByteBuffer> for ByteBufferInput {
    fn create(config: ByteBufferInputConfig) -> Result<Self> {
        Ok(Self {
            bytes: config.bytes,
            cursor: 0,
        })
    }
}

impl InputAdapterHandler for ByteBufferInput {
    fn read(&mut self, data: &mut [u8]) -> Result<()> {
        let start = self.cursor as usize;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= self.bytes.len() && start <= self.bytes.len())
            .ok_or_else(|| {
                VoxError::io(format!(
                    "read of {} bytes at {start} runs past the end of a {}-byte buffer",
                    data.len(),
                    self.bytes.len()
                ))
            })?;
        data.copy_from_slice(&self.bytes[start..end]);
        self.cursor = end as u64;
        Ok(())
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()> {
        self.cursor = origin.resolve(offset, self.cursor, self.bytes.len() as u64)?;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.cursor
    }
}

/// A growable byte buffer shared between the caller and an output adapter.
#[derive(Clone, Debug, Default)]
pub struct ByteBufferOutput {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl ByteBufferOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Moves the written bytes out, leaving the buffer empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().clone()
    }
}

pub struct ByteBufferOutputHandler {
    buffer: ByteBufferOutput,
    cursor: u64,
}

impl BaseAdapterHandler<Output, ByteBuffer> for ByteBufferOutputHandler {
    fn create(config: ByteBufferOutputConfig) -> Result<Self> {
        let mut handler = Self {
            buffer: config.buffer,
            cursor: 0,
        };
        handler.reserve(config.reserve)?;
        Ok(handler)
    }
}

impl OutputAdapterHandler for ByteBufferOutputHandler {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut bytes = self.buffer.lock();
        let start = self.cursor as usize;
        let end = start + data.len();
        if bytes.len() < end {
            bytes.resize(end, 0);
        }
        bytes[start..end].copy_from_slice(data);
        self.cursor = end as u64;
        Ok(())
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()> {
        let end = self.buffer.len() as u64;
        self.cursor = origin.resolve(offset, self.cursor, end)?;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.cursor
    }

    fn reserve(&mut self, size: usize) -> Result<()> {
        self.buffer.lock().reserve(size);
        Ok(())
    }
}
