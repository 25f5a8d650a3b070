//! TCP socket transport
//!
//! flashrom speaks serprog over TCP with `-p serprog:ip=HOST:PORT`, which
//! is the easiest way to point a real host tool at the simulator.

use std::io::{BufWriter, ErrorKind, Read, Write};
use std::net::TcpStream;

use ice_serprog_core::{Error, Result, Transport};

/// Server side of one serprog TCP connection
pub struct TcpTransport {
    reader: TcpStream,
    writer: BufWriter<TcpStream>,
}

impl TcpTransport {
    /// Wrap an accepted client connection
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        // Set TCP_NODELAY to reduce latency
        stream.set_nodelay(true)?;
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(Self {
            reader: stream,
            writer,
        })
    }
}

fn map_io(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof => Error::Disconnected,
        _ => {
            log::debug!("tcp: {}", e);
            Error::Transport
        }
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        // A blocking socket only returns 0 on EOF
        match self.reader.read(buf) {
            Ok(0) => Err(Error::Disconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(map_io(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        match self.writer.write(data) {
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            other => other.map_err(map_io),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(map_io)
    }
}
