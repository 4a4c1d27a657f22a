use super::*;
use std::io::Write;

pub struct StdOutHandler {
    written: u64,
}

impl BaseAdapterHandler<Output, StdOut> for StdOutHandler {
    fn create(_: ()) -> Result<Self> {
        Ok(Self { written: 0 })
    }
}

impl OutputAdapterHandler for StdOutHandler {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        std::io::stdout().lock().write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn seek(&mut self, _offset: i64, _origin: SeekOrigin) -> Result<()> {
        Err(VoxError::io("stdout cannot seek"))
    }

    fn tell(&self) -> u64 {
        self.written
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        std::io::stdout().flush()?;
        Ok(())
    }
}
