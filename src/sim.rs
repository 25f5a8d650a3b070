//! serprog-over-TCP simulator
//!
//! Runs the same engine as the firmware, but with a [`TcpTransport`] in
//! place of USB CDC and a [`DummyFlash`] in place of the real chip. One
//! client is served at a time; every session starts from a fresh boot of
//! the emulated board, while the flash contents persist.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

use ice_serprog_core::{Config, Error, Serprog, SoftSpi, SpiFlash, SECTOR_SIZE};
use ice_serprog_dummy::{DummyBoard, DummyConfig, DummyFlash};

use crate::cli::ServeArgs;
use crate::error::SimError;
use crate::tcp::TcpTransport;

/// Build the emulated flash chip from the command line
fn build_flash(args: &ServeArgs) -> Result<DummyFlash, SimError> {
    if args.size == 0 || args.size as usize % SECTOR_SIZE != 0 {
        return Err(SimError::InvalidSize(args.size));
    }
    if args.jedec_id > 0xFF_FFFF {
        return Err(SimError::InvalidJedecId(args.jedec_id));
    }

    let config = DummyConfig {
        manufacturer_id: (args.jedec_id >> 16) as u8,
        device_id: args.jedec_id as u16,
        size: args.size as usize,
        busy_polls: args.busy_polls,
        max_sck_hz: args.max_spi_freq,
        ..DummyConfig::default()
    };

    let Some(path) = &args.image else {
        return Ok(DummyFlash::new(config));
    };

    let image = std::fs::read(path).map_err(|source| SimError::ImageRead {
        path: path.clone(),
        source,
    })?;
    if image.len() > config.size {
        return Err(SimError::ImageTooLarge {
            len: image.len(),
            size: config.size,
        });
    }
    log::info!("Loaded {} bytes from {}", image.len(), path.display());
    Ok(DummyFlash::with_data(config, &image))
}

/// Turn an accepted connection into a transport
///
/// Returns `None` (after logging) when the client is already gone, so one
/// bad connection never stops the server.
fn accept_client(stream: io::Result<TcpStream>) -> Option<(TcpTransport, SocketAddr)> {
    let setup = stream.and_then(|stream| {
        let peer = stream.peer_addr()?;
        Ok((TcpTransport::new(stream)?, peer))
    });

    match setup {
        Ok((transport, peer)) => {
            log::info!("Client connected from {}", peer);
            Some((transport, peer))
        }
        Err(e) => {
            log::warn!("Dropping client: {}", e);
            None
        }
    }
}

/// Accept clients forever
pub fn serve(args: &ServeArgs) -> Result<(), SimError> {
    let engine_config = Config {
        sleep_on_release: args.sleep_on_release,
        ..Config::default()
    };

    let mut flash = SpiFlash::new(SoftSpi::new(build_flash(args)?));
    let mut board = DummyBoard::real_time();

    let listener = TcpListener::bind(&args.listen)?;
    log::info!("Listening on {}", listener.local_addr()?);

    for stream in listener.incoming() {
        let Some((transport, peer)) = accept_client(stream) else {
            continue;
        };

        let mut engine = Serprog::new(transport, flash, board, engine_config.clone());
        engine.start();

        match engine.run() {
            Err(Error::Disconnected) => log::info!("Client {} disconnected", peer),
            Err(e) => log::warn!("Session with {} ended: {}", peer, e),
            Ok(()) => {}
        }

        let (_, f, b) = engine.into_parts();
        flash = f;
        board = b;

        if let Some(path) = &args.dump {
            std::fs::write(path, flash.spi().master().data()).map_err(|source| {
                SimError::DumpWrite {
                    path: path.clone(),
                    source,
                }
            })?;
            log::info!("Flash contents written to {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::{Cli, Commands};

    fn args(extra: &[&str]) -> ServeArgs {
        let argv = ["ice-serprog", "serve"].iter().chain(extra.iter()).copied();
        let Commands::Serve(args) = Cli::parse_from(argv).command;
        args
    }

    #[test]
    fn test_build_flash_from_args() {
        let flash = build_flash(&args(&["--size", "64K", "--jedec-id", "0xC22016"])).unwrap();
        assert_eq!(flash.config().manufacturer_id, 0xC2);
        assert_eq!(flash.config().device_id, 0x2016);
        assert_eq!(flash.data().len(), 64 * 1024);
    }

    #[test]
    fn test_build_flash_rejects_bad_geometry() {
        assert!(matches!(
            build_flash(&args(&["--size", "1000"])),
            Err(SimError::InvalidSize(1000))
        ));
        assert!(matches!(
            build_flash(&args(&["--jedec-id", "0x1000000"])),
            Err(SimError::InvalidJedecId(_))
        ));
    }

    #[test]
    fn test_failed_client_is_skipped() {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(accept_client(Err(reset)).is_none());
    }

    #[test]
    fn test_accept_client() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        let (_, peer) = accept_client(listener.accept().map(|(s, _)| s)).unwrap();
        assert_eq!(peer, client.local_addr().unwrap());
    }

    #[test]
    fn test_missing_image() {
        let result = build_flash(&args(&["--image", "/nonexistent/ice-serprog.bin"]));
        assert!(matches!(result, Err(SimError::ImageRead { .. })));
    }
}
