//! SPI0 master. The kernel's SPI driver must not be loaded.

use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

use super::{
    gpio::{Function, Gpio},
    registers::{SPI0_CLK, SPI0_CS},
    Peripherals,
};
use crate::{concurrency::barrier::memory_barrier, Result, Spin};

/// Core clock SPI0 divides down from.
pub const CORE_CLOCK: u32 = 250_000_000;

/// Depth of both the transmit and the receive FIFO.
pub const FIFO_SIZE: usize = 16;

/// MISO, MOSI, SCLK and both chip selects.
const PINS: core::ops::RangeInclusive<u8> = 7..=11;

/// Clock divisor for `speed` bit/s. 0 stands for 65536, the slowest setting.
///
/// # Panics
/// If `speed` is 0.
pub fn clock_divisor(speed: u32) -> u32 {
    match CORE_CLOCK / speed {
        div if div > 0xffff => 0,
        div => div.max(2),
    }
}

pub struct Spi {
    peripherals: Peripherals,
    budget: Spin,
}

impl Spi {
    pub fn new(peripherals: Peripherals) -> Self {
        Self::with_budget(peripherals, Spin::forever())
    }

    pub fn with_budget(peripherals: Peripherals, budget: Spin) -> Self {
        Spi {
            peripherals,
            budget,
        }
    }

    /// Mode 1 (CPOL 0, CPHA 1) at `speed` bit/s, rounded down to what the
    /// divisor allows.
    pub fn init(&self, speed: u32) -> Result<()> {
        let spi = self.peripherals.spi0();
        let gpio = Gpio::new(self.peripherals);

        spi.clk.write(SPI0_CLK::CDIV.val(clock_divisor(speed)));
        spi.cs.modify(SPI0_CS::CPOL::CLEAR + SPI0_CS::CPHA::SET);

        memory_barrier();
        for pin in PINS {
            gpio.configure(pin, Function::Alt0)?;
        }
        memory_barrier();
        Ok(())
    }

    /// Begins a transfer to chip select `cs` (0 or 1) with an empty receive
    /// FIFO.
    pub fn start(&self, cs: u8) {
        self.peripherals.spi0().cs.modify(
            SPI0_CS::CS.val(u32::from(cs)) + SPI0_CS::CLEAR::Rx + SPI0_CS::TA::SET,
        );
    }

    /// Ends the transfer once everything queued has been sent.
    pub fn stop(&self) -> Result<()> {
        let mut spin = self.budget;
        let spi = self.peripherals.spi0();
        spin.wait_until(|| spi.cs.is_set(SPI0_CS::DONE))?;
        spi.cs.modify(SPI0_CS::TA::CLEAR);
        Ok(())
    }

    /// True if at least `num` bytes are waiting. Only exact for `num <= 1`;
    /// for larger values the FIFO level flags may report true early.
    pub fn poll(&self, num: usize) -> bool {
        let cs = &self.peripherals.spi0().cs;
        match num {
            0 => true,
            n if n < FIFO_SIZE * 3 / 4 => cs.is_set(SPI0_CS::RXD),
            n if n < FIFO_SIZE => cs.is_set(SPI0_CS::RXR),
            _ => cs.is_set(SPI0_CS::RXF),
        }
    }

    /// SPI only receives while sending; pair every read with a write.
    pub fn read(&self) -> Result<u8> {
        let mut spin = self.budget;
        let spi = self.peripherals.spi0();
        spin.wait_until(|| spi.cs.is_set(SPI0_CS::RXD))?;
        Ok(spi.fifo.get() as u8)
    }

    /// Requires [`Spi::start`] first.
    pub fn write(&self, byte: u8) -> Result<()> {
        let mut spin = self.budget;
        let spi = self.peripherals.spi0();
        spin.wait_until(|| spi.cs.is_set(SPI0_CS::TXD))?;
        spi.fifo.set(u32::from(byte));
        Ok(())
    }

    /// Waits until the transmit FIFO has drained or no transfer is active.
    pub fn flush(&self) -> Result<()> {
        let mut spin = self.budget;
        let cs = &self.peripherals.spi0().cs;
        spin.wait_until(|| !cs.is_set(SPI0_CS::TA) || cs.is_set(SPI0_CS::DONE))
    }
}
