//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a size with an optional K/M suffix (e.g. "16M", "4096", "0x1000")
fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let lower = s.to_lowercase();

    let (num, multiplier) = if let Some(n) = lower.strip_suffix("mib").or(lower.strip_suffix('m')) {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("kib").or(lower.strip_suffix('k')) {
        (n.trim(), 1024)
    } else {
        (lower.as_str(), 1)
    };

    parse_hex_u32(num)?
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Size too large: {}", s))
}

#[derive(Parser)]
#[command(name = "ice-serprog")]
#[command(author, version, about = "serprog programmer simulator", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve an emulated pico-ice over TCP (flashrom -p serprog:ip=HOST:PORT)
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:5555")]
    pub listen: String,

    /// Emulated flash size (e.g. 4M, 16M)
    #[arg(short, long, default_value = "16M", value_parser = parse_size)]
    pub size: u32,

    /// JEDEC ID reported by the emulated flash (manufacturer and device)
    #[arg(long, default_value = "0xEF4018", value_parser = parse_hex_u32)]
    pub jedec_id: u32,

    /// Initial flash contents
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Write the flash contents here after every session
    #[arg(short, long)]
    pub dump: Option<PathBuf>,

    /// Highest SPI clock the emulated wiring supports (fixed clock if unset)
    #[arg(long, value_parser = parse_hex_u32)]
    pub max_spi_freq: Option<u32>,

    /// Status polls a program or erase stays busy for
    #[arg(long, default_value_t = 2)]
    pub busy_polls: u32,

    /// Put the flash into deep power-down when the bus is released
    #[arg(long)]
    pub sleep_on_release: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("0x1000"), Ok(4096));
        assert_eq!(parse_size("16M"), Ok(16 * 1024 * 1024));
        assert_eq!(parse_size("64KiB"), Ok(64 * 1024));
        assert!(parse_size("4G").is_err());
        assert!(parse_size("8192M").is_err());
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::parse_from(["ice-serprog", "serve"]);
        let Commands::Serve(args) = cli.command;
        assert_eq!(args.listen, "127.0.0.1:5555");
        assert_eq!(args.size, 16 * 1024 * 1024);
        assert_eq!(args.jedec_id, 0xEF4018);
        assert!(args.image.is_none());
        assert!(!args.sleep_on_release);
    }
}
