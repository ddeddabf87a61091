//! Barriers for peripheral register accesses.
//!
//! The BCM283x peripheral bus does not keep accesses to different
//! peripherals in order. Reads from one peripheral may return data that
//! belongs to the previous one unless a barrier sits in between.
//!
//! On targets without a matching instruction both barriers only stop the
//! compiler from moving accesses across them.

#[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
use core::sync::atomic::{compiler_fence, Ordering};

#[cfg(target_arch = "aarch64")]
use aarch64_cpu::asm::barrier;

/// Stall any following memory access until those before this call have
/// completed. Call this after using a peripheral and between accesses to two
/// different peripherals.
#[inline(always)]
pub fn memory_barrier() {
    // ARMv6 CP15 data memory barrier
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!(
            "mcr p15, 0, {zero}, c7, c10, 5",
            zero = in(reg) 0u32,
            options(nostack, preserves_flags),
        );
    }

    #[cfg(target_arch = "aarch64")]
    barrier::dmb(barrier::SY);

    #[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
    compiler_fence(Ordering::SeqCst);
}

/// Stall execution until all pending memory accesses have completed. Stronger
/// than [`memory_barrier`], used at the end of a reconfiguration sequence.
#[inline(always)]
pub fn synchronization_barrier() {
    // ARMv6 CP15 data synchronization barrier
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!(
            "mcr p15, 0, {zero}, c7, c10, 4",
            zero = in(reg) 0u32,
            options(nostack, preserves_flags),
        );
    }

    #[cfg(target_arch = "aarch64")]
    barrier::dsb(barrier::SY);

    #[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
    compiler_fence(Ordering::SeqCst);
}

