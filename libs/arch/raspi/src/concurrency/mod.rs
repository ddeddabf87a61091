pub mod barrier;
pub mod spin;
pub mod spinlock;
