//! Mini UART (UART1) of the AUX block.
//!
//! Shares GPIO 14/15 with UART0, so only one of the two can be attached at a
//! time. Its bit rate follows the core clock.

use core::fmt::{self, Write};

use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

use super::{
    gpio::{Function, Gpio, Pull},
    registers::{AUX_DEVICES, MU_BAUD, MU_CNTL, MU_IIR, MU_IO, MU_LCR, MU_STAT},
    Peripherals,
};
use crate::{concurrency::barrier::memory_barrier, Result, Spin};

/// Core clock the mini UART divides down from.
pub const UART1_CLOCK: u32 = 250_000_000;

const TX_PIN: u8 = 14;
const RX_PIN: u8 = 15;

/// BAUD register value for `bitrate`. 115200 bit/s is the fastest rate the
/// mini UART handles reliably.
///
/// # Panics
/// If `bitrate` is 0.
pub fn baud_divisor(bitrate: u32) -> u32 {
    (UART1_CLOCK / 8 / bitrate).saturating_sub(1)
}

pub struct Uart1 {
    peripherals: Peripherals,
    budget: Spin,
}

impl Uart1 {
    pub fn new(peripherals: Peripherals) -> Self {
        Self::with_budget(peripherals, Spin::forever())
    }

    pub fn with_budget(peripherals: Peripherals, budget: Spin) -> Self {
        Uart1 {
            peripherals,
            budget,
        }
    }

    /// Attaches the mini UART to GPIO 14/15, 8N1 at `bitrate`, interrupts off.
    pub fn init(&self, bitrate: u32) -> Result<()> {
        let mut spin = self.budget;
        let aux = self.peripherals.aux();
        let uart = self.peripherals.uart1();
        let gpio = Gpio::new(self.peripherals);

        for pin in [TX_PIN, RX_PIN] {
            gpio.set_pull(pin, Pull::Off)?;
            gpio.configure(pin, Function::Alt5)?;
        }
        memory_barrier();

        aux.irq.modify(AUX_DEVICES::MINI_UART::CLEAR);
        aux.enables.modify(AUX_DEVICES::MINI_UART::SET);
        memory_barrier();

        // No flow control, receiver and transmitter off
        uart.cntl.set(0);
        spin.wait_until(|| uart.stat.is_set(MU_STAT::RX_IDLE))?;

        uart.ier.set(0);
        uart.lcr.write(MU_LCR::DATA_SIZE::EightBit);
        uart.baud.write(MU_BAUD::BAUD.val(baud_divisor(bitrate)));
        uart.iir.write(MU_IIR::FIFO::ClearBoth);
        memory_barrier();

        uart.cntl.modify(MU_CNTL::TX_ENABLE::SET + MU_CNTL::RX_ENABLE::SET);
        memory_barrier();
        Ok(())
    }

    /// True if at least `num` bytes are waiting. Only exact for `num <= 1`.
    pub fn poll(&self, num: usize) -> bool {
        num == 0 || self.peripherals.uart1().stat.is_set(MU_STAT::RX_READY)
    }

    pub fn read(&self) -> Result<u8> {
        let mut spin = self.budget;
        let uart = self.peripherals.uart1();
        spin.wait_until(|| uart.stat.is_set(MU_STAT::RX_READY))?;
        Ok(uart.io.read(MU_IO::DATA) as u8)
    }

    pub fn write(&self, byte: u8) -> Result<()> {
        let mut spin = self.budget;
        let uart = self.peripherals.uart1();
        spin.wait_until(|| uart.stat.is_set(MU_STAT::TX_READY))?;
        uart.io.write(MU_IO::DATA.val(u32::from(byte)));
        Ok(())
    }

    /// Waits until the transmitter is idle with an empty FIFO.
    pub fn flush(&self) -> Result<()> {
        let mut spin = self.budget;
        let uart = self.peripherals.uart1();
        spin.wait_until(|| uart.stat.is_set(MU_STAT::TX_DONE))
    }
}

impl Write for Uart1 {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            Uart1::write(self, byte).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}
