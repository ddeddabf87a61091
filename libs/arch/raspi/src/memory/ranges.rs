//! Physical base address of the peripheral block.
//!
//! Every board after the first Pi publishes the base in the device tree.
//! `soc/ranges` starts with two big-endian words: the bus address of the
//! block, then the address the CPU sees it at.

use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};

use super::layout::BUS_PERIPHERAL_BASE;

pub const SOC_RANGES_PATH: &str = "/proc/device-tree/soc/ranges";

/// CPU base of the first Pi models, which have no `soc/ranges` record.
pub const LEGACY_PERIPHERAL_BASE: u32 = 0x2000_0000;

const RECORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocRanges {
    pub bus_base: u32,
    pub cpu_base: u32,
}

impl SocRanges {
    /// Decodes the first record. Trailing bytes (size cell, further ranges)
    /// are ignored. Returns `None` if fewer than 8 bytes are given.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        bytes.get(..RECORD_LEN).map(Self::from_record)
    }

    pub fn read_from(path: &Path) -> io::Result<Self> {
        let mut record = [0u8; RECORD_LEN];
        File::open(path)?.read_exact(&mut record)?;
        Ok(Self::from_record(&record))
    }

    fn from_record(record: &[u8]) -> Self {
        SocRanges {
            bus_base: BigEndian::read_u32(&record[0..4]),
            cpu_base: BigEndian::read_u32(&record[4..8]),
        }
    }

    /// True if the board wires the block to the bus address every register
    /// offset in this crate assumes.
    pub fn matches_static_layout(&self) -> bool {
        self.bus_base == BUS_PERIPHERAL_BASE
    }
}

/// Base address of the peripheral block on the running board.
pub fn peripheral_base() -> u32 {
    peripheral_base_from(Path::new(SOC_RANGES_PATH), LEGACY_PERIPHERAL_BASE)
}

/// Reads the base from `path`, or returns `fallback` if the record is missing
/// or short. Never fails.
pub fn peripheral_base_from(path: &Path, fallback: u32) -> u32 {
    match SocRanges::read_from(path) {
        Ok(ranges) => {
            if !ranges.matches_static_layout() {
                warn!(
                    "{} maps the peripherals to bus address {:#010x}, expected {:#010x}; \
                     this board revision is not supported",
                    path.display(),
                    ranges.bus_base,
                    BUS_PERIPHERAL_BASE
                );
            }
            ranges.cpu_base
        }
        Err(err) => {
            debug!(
                "no usable record in {} ({err}), using {fallback:#010x}",
                path.display()
            );
            fallback
        }
    }
}
