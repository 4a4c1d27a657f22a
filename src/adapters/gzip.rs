use super::*;
use flate2::read::GzDecoder;
use std::io::{ErrorKind, Read};

/// Presents an input context as a `Read` that stops at the stream's end
/// instead of failing a short read.
struct CompressedStream {
    inner: AdapterContext<Input>,
    len: u64,
}

impl CompressedStream {
    fn new(mut inner: AdapterContext<Input>) -> Result<Self> {
        inner.seek(0, SeekOrigin::End)?;
        let len = inner.tell();
        inner.seek(0, SeekOrigin::Beg)?;
        Ok(Self { inner, len })
    }

    fn rewind(&mut self) -> Result<()> {
        self.inner.seek(0, SeekOrigin::Beg)
    }
}

impl Read for CompressedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.len.saturating_sub(self.inner.tell());
        let n = buf.len().min(remaining as usize);
        self.inner
            .read(&mut buf[..n])
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
        Ok(n)
    }
}

fn decode_error(e: std::io::Error) -> VoxError {
    match e.kind() {
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            VoxError::format(format!("corrupt gzip stream: {e}"))
        }
        _ => VoxError::io(format!("gzip read failed: {e}")),
    }
}

/// Decompresses on the fly. Forward seeks decode and discard; backward seeks
/// restart decoding from the start of the compressed stream.
pub struct GzipInput {
    decoder: Option<GzDecoder<CompressedStream>>,
    cursor: u64,
    decoded_len: Option<u64>,
}

impl BaseAdapterHandler<Input, Gzip> for GzipInput {
    fn create(config: GzipInputConfig) -> Result<Self> {
        let inner = config
            .inner
            .ok_or_else(|| VoxError::invalid_argument("gzip input needs an inner stream"))?;
        Ok(Self {
            decoder: Some(GzDecoder::new(CompressedStream::new(inner)?)),
            cursor: 0,
            decoded_len: None,
        })
    }
}

impl GzipInput {
    fn decoder(&mut self) -> Result<&mut GzDecoder<CompressedStream>> {
        self.decoder
            .as_mut()
            .ok_or_else(|| VoxError::io("gzip stream was left unusable by an earlier failure"))
    }

    fn restart(&mut self) -> Result<()> {
        let decoder = self
            .decoder
            .take()
            .ok_or_else(|| VoxError::io("gzip stream was left unusable by an earlier failure"))?;
        let mut stream = decoder.into_inner();
        stream.rewind()?;
        self.decoder = Some(GzDecoder::new(stream));
        self.cursor = 0;
        Ok(())
    }

    /// Decodes and drops up to `count` bytes, returning how many there were.
    fn skip(&mut self, count: u64) -> Result<u64> {
        let mut sink = std::io::sink();
        let skipped = std::io::copy(&mut self.decoder()?.take(count), &mut sink)
            .map_err(decode_error)?;
        self.cursor += skipped;
        Ok(skipped)
    }

    fn decoded_len(&mut self) -> Result<u64> {
        if let Some(len) = self.decoded_len {
            return Ok(len);
        }
        let start = self.cursor;
        self.skip(u64::MAX)?;
        let len = self.cursor;
        self.decoded_len = Some(len);
        self.move_to(start)?;
        Ok(len)
    }

    fn move_to(&mut self, target: u64) -> Result<()> {
        if target < self.cursor {
            self.restart()?;
        }
        let wanted = target - self.cursor;
        if self.skip(wanted)? < wanted {
            return Err(VoxError::io(format!(
                "seek to {target} is past the end of the decompressed stream"
            )));
        }
        Ok(())
    }
}

impl InputAdapterHandler for GzipInput {
    /// A failed read leaves the cursor where it was. The decoder has already
    /// consumed part of the request, so it is replayed up to the cursor.
    fn read(&mut self, data: &mut [u8]) -> Result<()> {
        let read = self.decoder()?.read_exact(data);
        if let Err(e) = read {
            let error = decode_error(e);
            let cursor = self.cursor;
            self.restart()?;
            self.skip(cursor)?;
            return Err(error);
        }
        self.cursor += data.len() as u64;
        Ok(())
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()> {
        let end = match origin {
            SeekOrigin::End => self.decoded_len()?,
            _ => 0,
        };
        let target = origin.resolve(offset, self.cursor, end)?;
        self.move_to(target)
    }

    fn tell(&self) -> u64 {
        self.cursor
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        match self.decoder {
            Some(decoder) => decoder.into_inner().inner.destroy(),
            None => Ok(()),
        }
    }
}
