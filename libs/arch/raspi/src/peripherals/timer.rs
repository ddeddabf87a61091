use core::{hint, time::Duration};

use tock_registers::interfaces::Readable;

use super::Peripherals;

/// The system timer counts at 1 MHz regardless of CPU clock scaling.
pub const TICKS_PER_SECOND: u32 = 1_000_000;
pub const TICKS_PER_MS: u32 = TICKS_PER_SECOND / 1000;
pub const TICKS_PER_US: u32 = TICKS_PER_SECOND / 1_000_000;

/// True if `after` is at least `diff` ticks past `before`. Correct across one
/// wrap of the 32-bit counter.
pub fn elapsed(before: u32, after: u32, diff: u32) -> bool {
    after.wrapping_sub(before) >= diff
}

/// Busy-wait source used by the protocol drivers.
pub trait Delay {
    fn delay_ticks(&self, ticks: u32);
}

impl<T: Delay + ?Sized> Delay for &T {
    fn delay_ticks(&self, ticks: u32) {
        (**self).delay_ticks(ticks)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemTimer {
    peripherals: Peripherals,
}

impl SystemTimer {
    pub fn new(peripherals: Peripherals) -> Self {
        SystemTimer { peripherals }
    }

    /// Low word of the counter.
    pub fn now(&self) -> u32 {
        self.peripherals.st().clo.get()
    }

    /// Full 64-bit counter value as time since boot.
    pub fn uptime(&self) -> Duration {
        let st = self.peripherals.st();
        loop {
            let high = st.chi.get();
            let low = st.clo.get();
            // CHI moves if CLO wrapped between the reads
            if st.chi.get() == high {
                return Duration::from_micros(u64::from(high) << 32 | u64::from(low));
            }
        }
    }

    pub fn delay(&self, ticks: u32) {
        let start = self.now();
        while !elapsed(start, self.now(), ticks) {
            hint::spin_loop();
        }
    }

    pub fn wait_for(&self, time: Duration) {
        let mut remaining = time.as_micros();
        while remaining > 0 {
            let chunk = remaining.min(u128::from(u32::MAX / 2)) as u32;
            self.delay(chunk);
            remaining -= u128::from(chunk);
        }
    }
}

impl Delay for SystemTimer {
    fn delay_ticks(&self, ticks: u32) {
        self.delay(ticks)
    }
}
