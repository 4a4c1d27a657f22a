use super::*;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

fn open_error(path: &std::path::Path, e: std::io::Error) -> VoxError {
    VoxError::io(format!("failed to open '{}': {e}", path.display()))
}

pub struct FileInput {
    reader: BufReader<std::fs::File>,
    base: u64,
    len: u64,
    cursor: u64,
}

impl BaseAdapterHandler<Input, File> for FileInput {
    fn create(config: FileInputConfig) -> Result<Self> {
        if config.path.as_os_str().is_empty() {
            return Err(VoxError::invalid_argument("file input needs a path"));
        }
        let file = std::fs::File::open(&config.path).map_err(|e| open_error(&config.path, e))?;
        let size = file.metadata()?.len();
        if config.byte_offset > size {
            return Err(VoxError::io(format!(
                "byte offset {} is past the end of '{}' ({size} bytes)",
                config.byte_offset,
                config.path.display()
            )));
        }
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(config.byte_offset))?;
        tracing::debug!(path = %config.path.display(), size, "opened file input");
        Ok(Self {
            reader,
            base: config.byte_offset,
            len: size - config.byte_offset,
            cursor: 0,
        })
    }
}

impl InputAdapterHandler for FileInput {
    /// A failed read leaves the cursor where it was.
    fn read(&mut self, data: &mut [u8]) -> Result<()> {
        if let Err(e) = self.reader.read_exact(data) {
            self.reader.seek(SeekFrom::Start(self.base + self.cursor))?;
            return Err(e.into());
        }
        self.cursor += data.len() as u64;
        Ok(())
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()> {
        let target = origin.resolve(offset, self.cursor, self.len)?;
        self.reader.seek(SeekFrom::Start(self.base + target))?;
        self.cursor = target;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.cursor
    }
}

pub struct FileOutput {
    writer: BufWriter<std::fs::File>,
    len: u64,
    cursor: u64,
}

impl BaseAdapterHandler<Output, File> for FileOutput {
    fn create(config: FileOutputConfig) -> Result<Self> {
        if config.path.as_os_str().is_empty() {
            return Err(VoxError::invalid_argument("file output needs a path"));
        }
        let file = std::fs::File::create(&config.path).map_err(|e| open_error(&config.path, e))?;
        tracing::debug!(path = %config.path.display(), "opened file output");
        Ok(Self {
            writer: BufWriter::new(file),
            len: 0,
            cursor: 0,
        })
    }
}

impl OutputAdapterHandler for FileOutput {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.cursor += data.len() as u64;
        self.len = self.len.max(self.cursor);
        Ok(())
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()> {
        let target = origin.resolve(offset, self.cursor, self.len)?;
        // Writing past the end leaves a hole the OS reads back as zeros.
        self.writer.seek(SeekFrom::Start(target))?;
        self.cursor = target;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.cursor
    }

    fn destroy(mut self: Box<Self>) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
