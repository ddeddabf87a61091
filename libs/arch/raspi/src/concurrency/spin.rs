//! Polling budget shared by every busy-wait loop in the crate.
//!
//! The register protocols wait on hardware with plain spin loops and no
//! timeout. [`Spin::forever`] keeps exactly that behavior. [`Spin::bounded`]
//! gives up with [`Error::Timeout`] once the budget is spent, which lets a
//! watchdog style caller or a test observe "the hardware never answered"
//! without hanging.

use core::hint;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spin {
    Forever,
    Bounded { remaining: u64 },
}

impl Default for Spin {
    fn default() -> Self {
        Spin::Forever
    }
}

impl Spin {
    pub const fn forever() -> Self {
        Spin::Forever
    }

    /// Allows at most `polls` unsuccessful polls over the whole operation the
    /// budget is handed to.
    pub const fn bounded(polls: u64) -> Self {
        Spin::Bounded { remaining: polls }
    }

    /// Consumes one poll.
    pub fn tick(&mut self) -> Result<()> {
        match self {
            Spin::Forever => Ok(()),
            Spin::Bounded { remaining: 0 } => Err(Error::Timeout),
            Spin::Bounded { remaining } => {
                *remaining -= 1;
                Ok(())
            }
        }
    }

    /// Polls `ready` until it returns true.
    pub fn wait_until(&mut self, mut ready: impl FnMut() -> bool) -> Result<()> {
        while !ready() {
            self.tick()?;
            hint::spin_loop();
        }
        Ok(())
    }
}
