use std::io::{Result, Write};

/// Forwards writes while taking the CRC-32 and length of exactly the bytes accepted.
pub struct CrcForward<W: Write> {
    inner: W,
    hasher: crc32fast::Hasher,
    pub counted: u64,
}

impl<W: Write> CrcForward<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            counted: 0,
        }
    }

    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CrcForward<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.counted += n as u64;
        Ok(n)
    }
    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}
