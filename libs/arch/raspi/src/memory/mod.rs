//! Locating and mapping the peripheral block.

pub mod layout;
pub mod mapper;
pub mod ranges;

pub use mapper::{map, map_with, mapped, Config, DevMem, Mapper, PhysicalMemory};
