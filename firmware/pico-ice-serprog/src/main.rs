//! serprog programmer firmware for the pico-ice
//!
//! Exposes the iCE40's configuration flash over USB CDC-ACM so flashrom
//! can program it with `-p serprog:dev=/dev/ttyACM0`. While the host is not
//! holding the bus, the flash pins float and the FPGA boots from it.
//!
//! ## Pin Assignments
//!
//! | Pin   | Function            |
//! |-------|---------------------|
//! | GP14  | flash SCK           |
//! | GP8   | flash MOSI          |
//! | GP11  | flash MISO          |
//! | GP9   | flash CS            |
//! | GP26  | FPGA CDONE (input)  |
//! | GP27  | FPGA CRESET_B       |

#![no_std]
#![no_main]

mod board;
mod config;
mod pins;
mod transport;

use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::USB;
use embassy_rp::usb::{Driver, InterruptHandler as UsbInterruptHandler};
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::{Builder, UsbDevice};
use ice_serprog_core::{Config, Serprog, SoftSpi, SpiFlash};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::board::IceBoard;
use crate::config::*;
use crate::pins::FlashPins;
use crate::transport::{CdcTransport, UsbDriver};

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => UsbInterruptHandler<USB>;
});

fn usb_config() -> embassy_usb::Config<'static> {
    let mut config = embassy_usb::Config::new(USB_VID, USB_PID);
    config.manufacturer = Some(USB_MANUFACTURER);
    config.product = Some(USB_PRODUCT);
    config.serial_number = Some(USB_SERIAL);
    config.max_power = 100;
    config.max_packet_size_0 = 64;

    // Required for composite devices with IADs (Interface Association Descriptors)
    config.device_class = 0xEF; // Miscellaneous
    config.device_sub_class = 0x02; // Common Class
    config.device_protocol = 0x01; // IAD

    config
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("pico-ice-serprog starting...");

    let p = embassy_rp::init(Default::default());

    // Hold the FPGA in reset until the boot sequence lets it go
    let creset = Output::new(p.PIN_27, Level::Low);
    let cdone = Input::new(p.PIN_26, Pull::None);
    let board = IceBoard::new(creset, cdone);

    let pins = FlashPins::new(p.PIN_14, p.PIN_8, p.PIN_11, p.PIN_9);
    info!(
        "flash bus: SCK=GP{} MOSI=GP{} MISO=GP{} CS=GP{}, FPGA CRESET=GP{} CDONE=GP{}",
        PIN_FLASH_SCK,
        PIN_FLASH_MOSI,
        PIN_FLASH_MISO,
        PIN_FLASH_CS,
        PIN_FPGA_CRESET,
        PIN_FPGA_CDONE
    );

    // ---- USB ----
    let driver = Driver::new(p.USB, Irqs);

    // Descriptor buffers (must be 'static)
    static CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    static CDC_STATE: StaticCell<State<'static>> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        usb_config(),
        CONFIG_DESC.init([0; 256]),
        BOS_DESC.init([0; 256]),
        MSOS_DESC.init([0; 256]),
        CONTROL_BUF.init([0; 64]),
    );

    let class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), USB_MAX_PACKET_SIZE);
    let usb = builder.build();
    spawner.must_spawn(usb_task(usb));

    // ---- serprog ----
    let flash = SpiFlash::new(SoftSpi::new(pins));
    let mut engine = Serprog::new(CdcTransport::new(class), flash, board, Config::default());

    let (manufacturer, device) = engine.start().await;
    info!(
        "flash JEDEC ID {=u8:02X} {=u16:04X}, FPGA released",
        manufacturer, device
    );

    info!("pico-ice-serprog ready, VID:PID = {:04x}:{:04x}", USB_VID, USB_PID);

    loop {
        engine.transport_mut().wait_connection().await;
        info!("host connected");

        if let Err(e) = engine.run().await {
            warn!("serprog session ended: {}", defmt::Display2Format(&e));
        }
        if engine.pin_state() {
            warn!("host left the flash bus claimed");
        }
    }
}

/// USB device task
#[embassy_executor::task]
async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) {
    usb.run().await;
}
