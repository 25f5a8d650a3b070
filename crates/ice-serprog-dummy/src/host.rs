//! Scripted host side of the serial link
//!
//! Feeds a prepared request stream to the engine and collects everything it
//! answers. Reads hand out at most `chunk` bytes at a time and every other
//! read comes back empty, so the engine's poll loops get exercised the way
//! a USB CDC endpoint would.

use std::collections::VecDeque;

use ice_serprog_core::{Error, Result, Transport};

/// In-memory transport driven by a request script
#[derive(Debug, Default)]
pub struct ScriptedHost {
    input: VecDeque<u8>,
    output: Vec<u8>,
    chunk: usize,
    starve: bool,
    /// Times the engine called `poll`
    pub polls: usize,
    /// Times the engine called `flush`
    pub flushes: usize,
}

impl ScriptedHost {
    /// Create a host that will send `requests`
    pub fn new(requests: &[u8]) -> Self {
        Self {
            input: requests.iter().copied().collect(),
            chunk: 64,
            ..Self::default()
        }
    }

    /// Limit how many bytes a single read returns
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    /// Take everything the engine has answered so far
    pub fn take_output(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.output)
    }

    /// Everything the engine has answered so far
    pub fn output(&self) -> &[u8] {
        &self.output
    }
}

impl Transport for ScriptedHost {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.input.is_empty() {
            return Err(Error::Disconnected);
        }

        // Alternate between "nothing yet" and a short burst
        self.starve = !self.starve;
        if self.starve {
            return Ok(0);
        }

        let n = buf.len().min(self.chunk).min(self.input.len());
        for (dst, src) in buf.iter_mut().zip(self.input.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let n = data.len().min(self.chunk);
        self.output.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn poll(&mut self) {
        self.polls += 1;
    }
}
