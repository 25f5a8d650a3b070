//! USB CDC-ACM transport
//!
//! serprog runs byte by byte, USB moves 64-byte packets. Incoming packets
//! are drained a slice at a time; outgoing bytes are collected until a
//! packet fills up or the engine flushes at the end of a command. A
//! transfer that ends on a full packet gets a zero-length packet so the
//! host sees it complete.

use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_usb::class::cdc_acm::CdcAcmClass;
use embassy_usb::driver::EndpointError;
use ice_serprog_core::{Error, Result, Transport};

use crate::config::USB_MAX_PACKET_SIZE;

const PACKET: usize = USB_MAX_PACKET_SIZE as usize;

pub type UsbDriver = Driver<'static, USB>;

pub struct CdcTransport {
    class: CdcAcmClass<'static, UsbDriver>,
    rx: [u8; PACKET],
    rx_pos: usize,
    rx_len: usize,
    tx: [u8; PACKET],
    tx_len: usize,
    /// Last packet sent was full, so the next flush owes a ZLP
    zlp_pending: bool,
}

impl CdcTransport {
    pub fn new(class: CdcAcmClass<'static, UsbDriver>) -> Self {
        Self {
            class,
            rx: [0; PACKET],
            rx_pos: 0,
            rx_len: 0,
            tx: [0; PACKET],
            tx_len: 0,
            zlp_pending: false,
        }
    }

    /// Wait for the host to open the port (DTR asserted)
    pub async fn wait_connection(&mut self) {
        self.class.wait_connection().await;
        self.rx_pos = 0;
        self.rx_len = 0;
        self.tx_len = 0;
        self.zlp_pending = false;
    }

    async fn send_packet(&mut self, len: usize) -> Result<()> {
        self.class
            .write_packet(&self.tx[..len])
            .await
            .map_err(map_endpoint)?;
        self.zlp_pending = len == PACKET;
        Ok(())
    }
}

fn map_endpoint(e: EndpointError) -> Error {
    match e {
        EndpointError::Disabled => Error::Disconnected,
        EndpointError::BufferOverflow => Error::Transport,
    }
}

impl Transport for CdcTransport {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.rx_pos == self.rx_len {
            self.rx_len = self
                .class
                .read_packet(&mut self.rx)
                .await
                .map_err(map_endpoint)?;
            self.rx_pos = 0;
        }

        let n = buf.len().min(self.rx_len - self.rx_pos);
        buf[..n].copy_from_slice(&self.rx[self.rx_pos..self.rx_pos + n]);
        self.rx_pos += n;
        Ok(n)
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let n = data.len().min(PACKET - self.tx_len);
        self.tx[self.tx_len..self.tx_len + n].copy_from_slice(&data[..n]);
        self.tx_len += n;

        if self.tx_len == PACKET {
            self.send_packet(PACKET).await?;
            self.tx_len = 0;
        }
        Ok(n)
    }

    async fn flush(&mut self) -> Result<()> {
        if self.tx_len > 0 {
            let len = self.tx_len;
            self.tx_len = 0;
            self.send_packet(len).await
        } else if self.zlp_pending {
            self.send_packet(0).await
        } else {
            Ok(())
        }
    }

    async fn poll(&mut self) {
        embassy_futures::yield_now().await;
    }
}
