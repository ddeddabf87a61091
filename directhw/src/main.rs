//! Demo tool for raspi-directhw.
//!
//! Needs read/write access to `/dev/mem`, so usually has to run as root.
//!
//! ```bash
//! # Peripheral base and register layout
//! directhw info
//!
//! # Blink an LED on GPIO 16 once per second, ten times
//! directhw blink --pin 16 --period-ms 1000 --count 10
//!
//! # Query and set firmware clocks
//! directhw clock get uart
//! directhw clock set uart 3000000
//!
//! # Wait for an SPI master on header P5
//! directhw spisl
//! ```

use std::{num::ParseIntError, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use raspi_directhw::{
    memory::{
        self,
        layout::{self, LAYOUT, PERIPHERALS_SIZE},
        Config, DevMem,
    },
    peripherals::{
        gpio::{Function, Gpio, PIN_COUNT},
        mailbox::{Clock, Mailbox},
        spisl::SpiSlave,
        timer::SystemTimer,
    },
    Peripherals,
};

#[derive(Parser)]
#[command(name = "directhw")]
#[command(version)]
#[command(about = "Direct Raspberry Pi peripheral access without kernel drivers")]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    mapping: MappingArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct MappingArgs {
    /// Physical memory device
    #[arg(long, global = true, default_value = memory::mapper::DEV_MEM_PATH)]
    mem: PathBuf,

    /// Device tree record with the bus and CPU base addresses
    #[arg(long, global = true, default_value = memory::ranges::SOC_RANGES_PATH)]
    ranges: PathBuf,

    /// Peripheral base address, skipping the device tree lookup
    #[arg(long, global = true, value_parser = parse_hex)]
    base: Option<u32>,
}

impl MappingArgs {
    fn config(&self) -> Config {
        Config {
            ranges_path: self.ranges.clone(),
            base: self.base,
            ..Config::default()
        }
    }

    fn map(&self) -> Result<Peripherals> {
        memory::map_with(&DevMem::new(&self.mem), &self.config())
            .with_context(|| format!("failed to map peripherals through {}", self.mem.display()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the peripheral base address and register layout
    Info {
        /// Also map the peripherals and ask the firmware for its revision
        #[arg(long)]
        firmware: bool,
    },

    /// Toggle a GPIO output
    Blink {
        #[arg(short, long, default_value_t = 16)]
        pin: u8,

        /// Length of one on/off cycle
        #[arg(long, default_value_t = 1000)]
        period_ms: u64,

        /// Number of cycles; blinks until interrupted if omitted
        #[arg(short, long)]
        count: Option<u64>,
    },

    /// Firmware clock operations
    #[command(subcommand)]
    Clock(ClockCommands),

    /// Run the PCM based SPI slave and synchronize with a master
    Spisl,
}

#[derive(Subcommand)]
enum ClockCommands {
    /// Configured rate, 0 if the clock is off
    Get {
        #[arg(value_parser = parse_clock)]
        clock: Clock,
    },

    /// Rate the firmware measures
    Measured {
        #[arg(value_parser = parse_clock)]
        clock: Clock,
    },

    /// Switch a clock on and set its rate in Hz
    Set {
        #[arg(value_parser = parse_clock)]
        clock: Clock,
        rate: u32,
    },
}

fn parse_hex(value: &str) -> Result<u32, ParseIntError> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => value.parse(),
    }
}

fn parse_clock(value: &str) -> Result<Clock, String> {
    if let Ok(id) = value.parse::<u32>() {
        return Clock::try_from(id).map_err(|id| format!("unknown clock id {id}"));
    }
    Ok(match value.to_ascii_lowercase().as_str() {
        "emmc" => Clock::Emmc,
        "uart" => Clock::Uart,
        "arm" => Clock::Arm,
        "core" => Clock::Core,
        "v3d" => Clock::V3d,
        "h264" => Clock::H264,
        "isp" => Clock::Isp,
        "sdram" => Clock::Sdram,
        "pixel" => Clock::Pixel,
        "pwm" => Clock::Pwm,
        "hevc" => Clock::Hevc,
        "emmc2" => Clock::Emmc2,
        "m2mc" => Clock::M2mc,
        "pixel-bvb" => Clock::PixelBvb,
        _ => return Err(format!("unknown clock {value:?}")),
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { firmware } => handle_info(&cli.mapping, firmware),
        Commands::Blink {
            pin,
            period_ms,
            count,
        } => handle_blink(&cli.mapping, pin, period_ms, count),
        Commands::Clock(cmd) => handle_clock(&cli.mapping, cmd),
        Commands::Spisl => handle_spisl(&cli.mapping),
    }
}

fn handle_info(mapping: &MappingArgs, firmware: bool) -> Result<()> {
    layout::validate(LAYOUT).context("built-in peripheral layout is inconsistent")?;

    let base = mapping.config().resolve_base();
    println!("Peripheral base: {base:#010x} ({PERIPHERALS_SIZE:#x} bytes)");
    println!("Bus base:        {:#010x}", layout::BUS_PERIPHERAL_BASE);
    println!();
    for (region, padding) in layout::paddings(LAYOUT) {
        println!("  {region}  +{padding:#x} padding");
    }

    if firmware {
        let hw = mapping.map()?;
        let revision = Mailbox::new(hw)
            .firmware_revision()
            .context("firmware revision query failed")?;
        println!();
        println!("Firmware revision: {revision:#010x}");
    }
    Ok(())
}

fn handle_blink(mapping: &MappingArgs, pin: u8, period_ms: u64, count: Option<u64>) -> Result<()> {
    if pin >= PIN_COUNT {
        bail!("GPIO {pin} does not exist, the last one is {}", PIN_COUNT - 1);
    }

    let hw = mapping.map()?;
    let gpio = Gpio::new(hw);
    let timer = SystemTimer::new(hw);
    let half = Duration::from_millis(period_ms) / 2;

    gpio.configure(pin, Function::Output)?;
    info!("blinking GPIO {pin} every {period_ms} ms");

    let mut cycles = 0;
    while count.map_or(true, |count| cycles < count) {
        gpio.set(pin)?;
        timer.wait_for(half);
        gpio.clear(pin)?;
        timer.wait_for(half);
        cycles += 1;
    }
    Ok(())
}

fn handle_clock(mapping: &MappingArgs, cmd: ClockCommands) -> Result<()> {
    let mailbox = Mailbox::new(mapping.map()?);

    match cmd {
        ClockCommands::Get { clock } => {
            let rate = mailbox
                .clock_rate(clock)
                .with_context(|| format!("failed to read the {clock:?} clock"))?;
            println!("{clock:?}: {rate} Hz");
        }
        ClockCommands::Measured { clock } => {
            let rate = mailbox
                .measured_clock_rate(clock)
                .with_context(|| format!("failed to measure the {clock:?} clock"))?;
            println!("{clock:?}: {rate} Hz (measured)");
        }
        ClockCommands::Set { clock, rate } => {
            mailbox
                .set_clock_rate(clock, rate)
                .with_context(|| format!("failed to set the {clock:?} clock"))?;
            println!("{clock:?}: set to {rate} Hz");
        }
    }
    Ok(())
}

fn handle_spisl(mapping: &MappingArgs) -> Result<()> {
    let hw = mapping.map()?;
    let slave = SpiSlave::new(hw, SystemTimer::new(hw));

    slave.init().context("PCM setup failed")?;
    info!("waiting for the master to send the sync marker");
    let report = slave.synchronize().context("synchronization failed")?;

    println!("Synchronized");
    println!("  bytes consumed:  {}", report.consumed);
    println!("  clock glitches:  {}", report.glitches);
    println!("  handshake bytes: {}", report.handshake_bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_decimal_bases() {
        assert_eq!(parse_hex("0x3F000000"), Ok(0x3f00_0000));
        assert_eq!(parse_hex("0XFE000000"), Ok(0xfe00_0000));
        assert_eq!(parse_hex("536870912"), Ok(0x2000_0000));
        assert!(parse_hex("0xzz").is_err());
    }

    #[test]
    fn clocks_by_name_or_id() {
        assert_eq!(parse_clock("uart"), Ok(Clock::Uart));
        assert_eq!(parse_clock("ARM"), Ok(Clock::Arm));
        assert_eq!(parse_clock("4"), Ok(Clock::Core));
        assert!(parse_clock("99").is_err());
        assert!(parse_clock("gpu").is_err());
    }

    #[test]
    fn cli_parses_global_mapping_flags() {
        let cli = Cli::try_parse_from([
            "directhw",
            "blink",
            "--pin",
            "21",
            "--count",
            "3",
            "--base",
            "0x3f000000",
        ])
        .unwrap();

        assert_eq!(cli.mapping.base, Some(0x3f00_0000));
        assert_eq!(cli.mapping.mem, PathBuf::from("/dev/mem"));
        assert!(matches!(
            cli.command,
            Commands::Blink {
                pin: 21,
                period_ms: 1000,
                count: Some(3)
            }
        ));
    }

    #[test]
    fn clock_set_takes_a_rate() {
        let cli = Cli::try_parse_from(["directhw", "clock", "set", "uart", "3000000"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Clock(ClockCommands::Set {
                clock: Clock::Uart,
                rate: 3_000_000
            })
        ));
    }
}
