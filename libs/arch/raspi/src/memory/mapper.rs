use std::{
    fs::OpenOptions,
    io,
    os::unix::fs::OpenOptionsExt,
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
    ptr::{self, NonNull},
};

use generic_once_cell::OnceCell;
use log::{debug, info};

use super::{
    layout::{self, LAYOUT, PERIPHERALS_SIZE},
    ranges::{self, LEGACY_PERIPHERAL_BASE, SOC_RANGES_PATH},
};
use crate::{concurrency::spinlock::RawSpinlock, peripherals::Peripherals, Error, Result};

pub const DEV_MEM_PATH: &str = "/dev/mem";

/// Where the peripheral block is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Device tree record holding the bus and CPU base addresses.
    pub ranges_path: PathBuf,
    /// Used when `ranges_path` is missing or short.
    pub fallback_base: u32,
    /// Skips the lookup entirely.
    pub base: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ranges_path: PathBuf::from(SOC_RANGES_PATH),
            fallback_base: LEGACY_PERIPHERAL_BASE,
            base: None,
        }
    }
}

impl Config {
    pub fn resolve_base(&self) -> u32 {
        match self.base {
            Some(base) => base,
            None => ranges::peripheral_base_from(&self.ranges_path, self.fallback_base),
        }
    }
}

/// Source of physical memory mappings.
pub trait PhysicalMemory {
    /// Maps `len` bytes of physical memory starting at `base`. The mapping is
    /// never released.
    fn map(&self, base: u32, len: usize) -> Result<NonNull<u8>>;
}

/// The kernel's physical memory device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevMem {
    pub path: PathBuf,
}

impl Default for DevMem {
    fn default() -> Self {
        DevMem {
            path: PathBuf::from(DEV_MEM_PATH),
        }
    }
}

impl DevMem {
    pub fn new(path: impl AsRef<Path>) -> Self {
        DevMem {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl PhysicalMemory for DevMem {
    fn map(&self, base: u32, len: usize) -> Result<NonNull<u8>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&self.path)
            .map_err(|source| Error::Open {
                path: self.path.clone(),
                source,
            })?;

        let addr = unsafe { mmap_physical(file.as_raw_fd(), base, len) };
        // Capture errno before the descriptor is closed
        let result = if addr == libc::MAP_FAILED {
            Err(io::Error::last_os_error())
        } else {
            Ok(addr)
        };
        drop(file);

        let addr = result.map_err(|source| Error::Map { base, len, source })?;
        NonNull::new(addr.cast::<u8>()).ok_or_else(|| Error::Map {
            base,
            len,
            source: io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping"),
        })
    }
}

#[cfg(target_os = "linux")]
unsafe fn mmap_physical(fd: libc::c_int, base: u32, len: usize) -> *mut libc::c_void {
    libc::mmap64(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED | libc::MAP_LOCKED | libc::MAP_POPULATE,
        fd,
        libc::off64_t::from(base),
    )
}

#[cfg(not(target_os = "linux"))]
unsafe fn mmap_physical(fd: libc::c_int, base: u32, len: usize) -> *mut libc::c_void {
    libc::mmap(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        libc::off_t::from(base),
    )
}

/// Maps the peripheral block at most once.
pub struct Mapper {
    region: OnceCell<RawSpinlock, Peripherals>,
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Mapper {
    pub const fn new() -> Self {
        Mapper {
            region: OnceCell::new(),
        }
    }

    /// Returns the existing handle, or validates the layout, resolves the base
    /// and maps the block. A failed attempt leaves the mapper empty so the call
    /// can be retried. `memory` and `config` are ignored once a handle exists.
    pub fn map(&self, memory: &impl PhysicalMemory, config: &Config) -> Result<Peripherals> {
        self.region
            .get_or_try_init(|| -> Result<Peripherals> {
                layout::validate(LAYOUT)?;
                let base = config.resolve_base();
                info!("mapping {PERIPHERALS_SIZE:#x} bytes of peripherals at {base:#010x}");
                let region = memory.map(base, PERIPHERALS_SIZE)?;
                debug!("peripherals mapped at {:p}", region);
                // SAFETY: the mapping covers PERIPHERALS_SIZE bytes and is never unmapped
                Ok(unsafe { Peripherals::from_ptr(region) })
            })
            .copied()
    }

    pub fn get(&self) -> Option<Peripherals> {
        self.region.get().copied()
    }
}

static MAPPER: Mapper = Mapper::new();

/// Maps the peripheral block of the running board from `/dev/mem`.
///
/// Idempotent: every call after the first successful one returns the same
/// handle without touching the device again.
pub fn map() -> Result<Peripherals> {
    map_with(&DevMem::default(), &Config::default())
}

/// [`map`] with an explicit device and lookup configuration. Has no effect on
/// the process-wide mapping if it already exists.
pub fn map_with(memory: &impl PhysicalMemory, config: &Config) -> Result<Peripherals> {
    MAPPER.map(memory, config)
}

/// The process-wide handle, if [`map`] has succeeded before.
pub fn mapped() -> Option<Peripherals> {
    MAPPER.get()
}
