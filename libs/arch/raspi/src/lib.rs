//! Direct access to the Raspberry Pi peripheral registers from a Linux user
//! space process, without going through the kernel drivers.
//!
//! [`memory::map`] maps the whole peripheral block from `/dev/mem` once and
//! hands out a [`Peripherals`] handle. Everything else (GPIO, system timer,
//! mailbox, UART0, mini UART, SPI0, PCM based SPI slave) is built on top of
//! that handle.
//!
//! Always put a [`memory_barrier`] between accesses to two different
//! peripherals. The peripheral bus may return data out of order otherwise.

pub mod concurrency;
pub mod memory;
pub mod peripherals;

#[cfg(test)]
mod testing;

use std::{io, path::PathBuf};

pub use concurrency::barrier::{memory_barrier, synchronization_barrier};
pub use concurrency::spin::Spin;
pub use memory::map;
pub use peripherals::Peripherals;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot map {len:#x} bytes of physical memory at {base:#010x}: {source}")]
    Map {
        base: u32,
        len: usize,
        #[source]
        source: io::Error,
    },

    #[error("peripheral layout is inconsistent: {0}")]
    Layout(#[from] memory::layout::LayoutError),

    /// The firmware only sees the low 32 bits of a message buffer address.
    #[error("mailbox buffer at {0:#x} is not addressable by the firmware")]
    BufferAddress(usize),

    #[error("invalid GPIO pin {0}")]
    InvalidPin(u8),

    #[error("hardware did not respond within the spin budget")]
    Timeout,
}

pub type Result<T> = core::result::Result<T, Error>;
