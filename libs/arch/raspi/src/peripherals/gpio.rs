use core::hint;

use bitfield::{Bit, BitRangeMut};
use tock_registers::interfaces::{Readable, Writeable};

use super::{registers::GPIO_PUD, Peripherals};
use crate::{Error, Result};

/// Number of GPIO lines on the BCM283x.
pub const PIN_COUNT: u8 = 54;

/// Cycles the pull-up/down control lines need to settle.
const PULL_SETTLE_CYCLES: usize = 150;

/// Pin function select values. The alternate functions are not numbered in
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Function {
    Input = 0,
    Output = 1,
    Alt0 = 4,
    Alt1 = 5,
    Alt2 = 6,
    Alt3 = 7,
    Alt4 = 3,
    Alt5 = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Off,
    Down,
    Up,
}

pub struct Gpio {
    peripherals: Peripherals,
}

impl Gpio {
    pub fn new(peripherals: Peripherals) -> Self {
        Gpio { peripherals }
    }

    fn check(pin: u8) -> Result<usize> {
        if pin < PIN_COUNT {
            Ok(pin as usize)
        } else {
            Err(Error::InvalidPin(pin))
        }
    }

    pub fn configure(&self, pin: u8, function: Function) -> Result<()> {
        let pin = Self::check(pin)?;
        let fsel = &self.peripherals.gpio().fsel[pin / 10];
        let lsb = (pin % 10) * 3;

        let mut word = fsel.get();
        word.set_bit_range(lsb + 2, lsb, function as u32);
        fsel.set(word);
        Ok(())
    }

    /// Drives an output high.
    pub fn set(&self, pin: u8) -> Result<()> {
        let pin = Self::check(pin)?;
        self.peripherals.gpio().set[pin / 32].set(1 << (pin % 32));
        Ok(())
    }

    /// Drives an output low.
    pub fn clear(&self, pin: u8) -> Result<()> {
        let pin = Self::check(pin)?;
        self.peripherals.gpio().clr[pin / 32].set(1 << (pin % 32));
        Ok(())
    }

    /// Current level of the pin.
    pub fn read(&self, pin: u8) -> Result<bool> {
        let pin = Self::check(pin)?;
        Ok(self.peripherals.gpio().lev[pin / 32].get().bit(pin % 32))
    }

    /// Latches a pull-up/down setting into one pin.
    pub fn set_pull(&self, pin: u8, pull: Pull) -> Result<()> {
        let pin = Self::check(pin)?;
        let gpio = self.peripherals.gpio();

        gpio.pud.write(match pull {
            Pull::Off => GPIO_PUD::PUD::Off,
            Pull::Down => GPIO_PUD::PUD::Down,
            Pull::Up => GPIO_PUD::PUD::Up,
        });
        settle();
        gpio.pudclk[pin / 32].set(1 << (pin % 32));
        settle();
        gpio.pud.write(GPIO_PUD::PUD::Off);
        gpio.pudclk[pin / 32].set(0);
        Ok(())
    }
}

fn settle() {
    for _ in 0..PULL_SETTLE_CYCLES {
        hint::spin_loop();
    }
}
