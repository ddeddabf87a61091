//! Byte layout of the BCM283x peripheral block.
//!
//! Offsets are relative to the start of the mapped region. Everything not
//! covered by a [`SubRegion`] is reserved padding. [`validate`] runs before the
//! region is mapped and rejects a table that would let two register blocks
//! alias each other.

use core::fmt;

/// Size of the whole peripheral block.
pub const PERIPHERALS_SIZE: usize = 0xF0_0000;

/// Offset of the peripheral block in the VideoCore bus address space.
pub const BUS_PERIPHERAL_BASE: u32 = 0x7E00_0000;

pub const ST_OFFSET: usize = 0x00_3000;
pub const DMA_OFFSET: usize = 0x00_7000;
pub const DMA_GLOBAL_OFFSET: usize = 0x00_7FE0;
pub const IRQ_OFFSET: usize = 0x00_B200;
pub const TIMER_OFFSET: usize = 0x00_B400;
pub const MBOX_OFFSET: usize = 0x00_B880;
pub const PM_OFFSET: usize = 0x10_0000;
pub const CM_OFFSET: usize = 0x10_1000;
pub const GPCLK_OFFSET: usize = 0x10_1070;
pub const RNG_OFFSET: usize = 0x10_4000;
pub const GPIO_OFFSET: usize = 0x20_0000;
pub const UART0_OFFSET: usize = 0x20_1000;
pub const MMC_OFFSET: usize = 0x20_2000;
pub const PCM_OFFSET: usize = 0x20_3000;
pub const SPI0_OFFSET: usize = 0x20_4000;
pub const BSC0_OFFSET: usize = 0x20_5000;
pub const PWM_OFFSET: usize = 0x20_C000;
pub const BSCSL_OFFSET: usize = 0x21_4000;
pub const AUX_OFFSET: usize = 0x21_5000;
pub const UART1_OFFSET: usize = 0x21_5040;
pub const SPI1_OFFSET: usize = 0x21_5080;
pub const SPI2_OFFSET: usize = 0x21_50C0;
pub const EMMC_OFFSET: usize = 0x30_0000;
pub const BSC1_OFFSET: usize = 0x80_4000;
pub const BSC2_OFFSET: usize = 0x80_5000;
pub const USB_OFFSET: usize = 0x98_0000;
pub const DMA15_OFFSET: usize = 0xE0_5000;

/// Number of clock manager entries (CTL/DIV pairs) starting at [`CM_OFFSET`].
pub const CM_ENTRIES: usize = 57;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRegion {
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
}

impl SubRegion {
    const fn new(name: &'static str, offset: usize, size: usize) -> Self {
        SubRegion { name, offset, size }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.size
    }
}

impl fmt::Display for SubRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<10} {:#08x}..{:#08x} (bus {:#010x})",
            self.name,
            self.offset,
            self.end(),
            bus_address(self.offset)
        )
    }
}

/// Every documented sub-region, sorted by offset.
pub const LAYOUT: &[SubRegion] = &[
    SubRegion::new("ST", ST_OFFSET, 0x1C),
    SubRegion::new("DMA", DMA_OFFSET, 15 * 0x100),
    SubRegion::new("DMA_GLOBAL", DMA_GLOBAL_OFFSET, 0x14),
    SubRegion::new("IRQ", IRQ_OFFSET, 0x28),
    SubRegion::new("TIMER", TIMER_OFFSET, 0x24),
    SubRegion::new("MBOX", MBOX_OFFSET, 0x40),
    SubRegion::new("PM", PM_OFFSET, 0x7C),
    SubRegion::new("CM", CM_OFFSET, CM_ENTRIES * 8),
    SubRegion::new("RNG", RNG_OFFSET, 0x14),
    SubRegion::new("GPIO", GPIO_OFFSET, 0xB4),
    SubRegion::new("UART0", UART0_OFFSET, 0x90),
    SubRegion::new("MMC", MMC_OFFSET, 0x54),
    SubRegion::new("PCM", PCM_OFFSET, 0x24),
    SubRegion::new("SPI0", SPI0_OFFSET, 0x18),
    SubRegion::new("BSC0", BSC0_OFFSET, 0x20),
    SubRegion::new("PWM", PWM_OFFSET, 0x28),
    SubRegion::new("BSCSL", BSCSL_OFFSET, 0x40),
    SubRegion::new("AUX", AUX_OFFSET, 0x08),
    SubRegion::new("UART1", UART1_OFFSET, 0x2C),
    SubRegion::new("SPI1", SPI1_OFFSET, 0x40),
    SubRegion::new("SPI2", SPI2_OFFSET, 0x40),
    SubRegion::new("EMMC", EMMC_OFFSET, 0x100),
    SubRegion::new("BSC1", BSC1_OFFSET, 0x20),
    SubRegion::new("BSC2", BSC2_OFFSET, 0x20),
    SubRegion::new("USB", USB_OFFSET, 0x8C),
    SubRegion::new("DMA15", DMA15_OFFSET, 0x100),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("{name} at {offset:#x} is not 32-bit aligned")]
    Unaligned { name: &'static str, offset: usize },

    #[error("{first} overlaps {second}")]
    Overlap {
        first: &'static str,
        second: &'static str,
    },

    #[error("{name} ends at {end:#x}, past the end of the peripheral block")]
    OutOfBounds { name: &'static str, end: usize },
}

/// Checks a layout table: word aligned, sorted, disjoint and inside the block.
pub fn validate(layout: &[SubRegion]) -> Result<(), LayoutError> {
    for region in layout {
        if region.offset % 4 != 0 || region.size % 4 != 0 {
            return Err(LayoutError::Unaligned {
                name: region.name,
                offset: region.offset,
            });
        }
        if region.end() > PERIPHERALS_SIZE {
            return Err(LayoutError::OutOfBounds {
                name: region.name,
                end: region.end(),
            });
        }
    }

    for pair in layout.windows(2) {
        if pair[1].offset < pair[0].end() {
            return Err(LayoutError::Overlap {
                first: pair[0].name,
                second: pair[1].name,
            });
        }
    }

    Ok(())
}

/// Reserved bytes following each sub-region, up to the next one or to the end
/// of the block.
///
/// Only meaningful for a table that passed [`validate`].
pub fn paddings(layout: &[SubRegion]) -> impl Iterator<Item = (&SubRegion, usize)> + '_ {
    layout.iter().enumerate().map(move |(i, region)| {
        let next = layout
            .get(i + 1)
            .map_or(PERIPHERALS_SIZE, |next| next.offset);
        (region, next - region.end())
    })
}

/// Looks a sub-region up by name.
pub fn find(name: &str) -> Option<&'static SubRegion> {
    LAYOUT.iter().find(|region| region.name.eq_ignore_ascii_case(name))
}

/// Address of a peripheral register as seen by the DMA controller and the
/// VideoCore firmware.
pub const fn bus_address(offset: usize) -> u32 {
    BUS_PERIPHERAL_BASE + offset as u32
}
