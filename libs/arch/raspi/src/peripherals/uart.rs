use core::fmt::{self, Write};

use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

use super::{
    gpio::{Function, Gpio, Pull},
    mailbox::{Clock, Mailbox},
    registers::{UART0_CR, UART0_DR, UART0_FBRD, UART0_FR, UART0_IBRD, UART0_LCRH},
    Peripherals,
};
use crate::{concurrency::barrier::memory_barrier, Result, Spin};

/// Reference clock the firmware is asked to provide for UART0.
pub const UART_CLOCK: u32 = 3_000_000;

const TX_PIN: u8 = 14;
const RX_PIN: u8 = 15;

/// PL011 UART0 on GPIO 14/15, 8N1 with FIFOs enabled.
pub struct Uart {
    peripherals: Peripherals,
    budget: Spin,
}

impl Uart {
    pub fn new(peripherals: Peripherals) -> Self {
        Self::with_budget(peripherals, Spin::forever())
    }

    pub fn with_budget(peripherals: Peripherals, budget: Spin) -> Self {
        Uart {
            peripherals,
            budget,
        }
    }

    /// Sets the UART reference clock through the firmware, then configures
    /// the port for `bitrate`.
    pub fn init(&self, bitrate: u32) -> Result<()> {
        Mailbox::with_budget(self.peripherals, self.budget).set_clock_rate(Clock::Uart, UART_CLOCK)?;
        self.configure(bitrate)
    }

    /// Programs the port assuming the reference clock already runs at
    /// [`UART_CLOCK`].
    ///
    /// # Panics
    /// If `bitrate` is 0.
    pub fn configure(&self, bitrate: u32) -> Result<()> {
        let mut spin = self.budget;
        let uart = self.peripherals.uart0();
        let gpio = Gpio::new(self.peripherals);

        uart.cr.modify(UART0_CR::UARTEN::CLEAR);
        spin.wait_until(|| !uart.fr.is_set(UART0_FR::BUSY))?;

        uart.cr.write(UART0_CR::TXE::SET + UART0_CR::RXE::SET);
        uart.lcrh
            .write(UART0_LCRH::FEN::SET + UART0_LCRH::WLEN::EightBit);
        uart.ibrd
            .write(UART0_IBRD::IBRD.val(UART_CLOCK / bitrate / 16));
        // 6 fractional bits
        uart.fbrd
            .write(UART0_FBRD::FBRD.val((UART_CLOCK * 4 / bitrate) % 64));

        memory_barrier();
        uart.cr.modify(UART0_CR::UARTEN::SET);

        for pin in [TX_PIN, RX_PIN] {
            gpio.set_pull(pin, Pull::Off)?;
            gpio.configure(pin, Function::Alt0)?;
        }
        memory_barrier();
        Ok(())
    }

    /// True if a byte can be read without waiting.
    pub fn poll(&self) -> bool {
        !self.peripherals.uart0().fr.is_set(UART0_FR::RXFE)
    }

    pub fn read(&self) -> Result<u8> {
        let mut spin = self.budget;
        spin.wait_until(|| self.poll())?;
        Ok(self.peripherals.uart0().dr.read(UART0_DR::DATA) as u8)
    }

    pub fn write(&self, byte: u8) -> Result<()> {
        let mut spin = self.budget;
        let uart = self.peripherals.uart0();
        spin.wait_until(|| !uart.fr.is_set(UART0_FR::TXFF))?;
        uart.dr.write(UART0_DR::DATA.val(u32::from(byte)));
        Ok(())
    }

    /// Waits until the last byte has left the shift register.
    pub fn flush(&self) -> Result<()> {
        let mut spin = self.budget;
        let uart = self.peripherals.uart0();
        spin.wait_until(|| uart.fr.is_set(UART0_FR::TXFE) && !uart.fr.is_set(UART0_FR::BUSY))
    }
}

impl Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            Uart::write(self, byte).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}
