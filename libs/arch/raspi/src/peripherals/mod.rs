use core::{fmt, ptr::NonNull};

use crate::memory::layout::{
    AUX_OFFSET, CM_OFFSET, GPIO_OFFSET, MBOX_OFFSET, PCM_OFFSET, SPI0_OFFSET, ST_OFFSET,
    UART0_OFFSET, UART1_OFFSET,
};

use self::registers::{
    AuxRegisters, ClockManager, ClockManagerRegisters, GpioRegisters, MailboxRegisters,
    PcmRegisters, Spi0Registers, SystemTimerRegisters, Uart0Registers, Uart1Registers,
};

pub mod gpio;
pub mod mailbox;
pub mod registers;
pub mod spi;
pub mod spisl;
pub mod timer;
pub mod uart;
pub mod uart1;

/// Handle to the mapped peripheral block.
///
/// Obtained from [`crate::memory::map`]. Cheap to copy; every driver takes
/// one by value. The handle does not serialize access: two threads driving
/// the same peripheral must coordinate themselves.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Peripherals {
    base: NonNull<u8>,
}

// The region is a fixed block of device memory that outlives every handle.
unsafe impl Send for Peripherals {}
unsafe impl Sync for Peripherals {}

impl Peripherals {
    /// # Safety
    /// `base` must point to [`PERIPHERALS_SIZE`] bytes of readable and writable
    /// memory, aligned to 4 bytes, that stays valid for the rest of the
    /// process.
    ///
    /// [`PERIPHERALS_SIZE`]: crate::memory::layout::PERIPHERALS_SIZE
    pub unsafe fn from_ptr(base: NonNull<u8>) -> Self {
        Peripherals { base }
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.base
    }

    fn block<T>(&self, offset: usize) -> &T {
        // SAFETY: offsets come from the validated layout table and the block
        // outlives the handle
        unsafe { &*self.base.as_ptr().add(offset).cast::<T>() }
    }

    pub fn st(&self) -> &SystemTimerRegisters {
        self.block(ST_OFFSET)
    }

    pub fn cm(&self, entry: ClockManager) -> &ClockManagerRegisters {
        self.block(CM_OFFSET + entry.offset())
    }

    pub fn gpio(&self) -> &GpioRegisters {
        self.block(GPIO_OFFSET)
    }

    pub fn mailbox(&self) -> &MailboxRegisters {
        self.block(MBOX_OFFSET)
    }

    pub fn uart0(&self) -> &Uart0Registers {
        self.block(UART0_OFFSET)
    }

    pub fn pcm(&self) -> &PcmRegisters {
        self.block(PCM_OFFSET)
    }

    pub fn spi0(&self) -> &Spi0Registers {
        self.block(SPI0_OFFSET)
    }

    pub fn aux(&self) -> &AuxRegisters {
        self.block(AUX_OFFSET)
    }

    pub fn uart1(&self) -> &Uart1Registers {
        self.block(UART1_OFFSET)
    }
}

impl fmt::Debug for Peripherals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peripherals")
            .field("base", &self.base)
            .finish()
    }
}
