//! Transport layer abstraction
//!
//! The engine talks to the host through a duplex byte stream. Reads and
//! writes may be partial; the provided [`Transport::read_exact`] and
//! [`Transport::write_all`] spin until the whole buffer has moved, calling
//! [`Transport::poll`] on every iteration so single-threaded stacks (a USB
//! device that needs servicing, an async executor) can make progress.
//!
//! These traits use `maybe_async` to support both sync and async modes.

use crate::error::Result;
use maybe_async::maybe_async;

/// Byte-stream transport to the host
#[maybe_async(AFIT)]
pub trait Transport {
    /// Read whatever is available into `buf`
    ///
    /// Returns the number of bytes read; 0 means nothing was available yet.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Queue as much of `data` as fits
    ///
    /// Returns the number of bytes accepted; 0 means no space yet.
    async fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Push queued bytes out to the host
    async fn flush(&mut self) -> Result<()>;

    /// Service hook called while waiting for data or buffer space
    async fn poll(&mut self) {}

    /// Read exactly `buf.len()` bytes
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut offset = 0;
        while offset < buf.len() {
            self.poll().await;
            offset += self.read(&mut buf[offset..]).await?;
        }
        Ok(())
    }

    /// Read a single byte
    async fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte).await?;
        Ok(byte[0])
    }

    /// Write all of `data`
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            self.poll().await;
            offset += self.write(&data[offset..]).await?;
        }
        Ok(())
    }

    /// Write a single byte
    async fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_all(&[byte]).await
    }
}
