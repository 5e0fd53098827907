// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Barriers, cache and TLB maintenance used around the power coordination protocols.
//!
//! On other architectures (i.e. host unit tests) these are all no-ops.

#[cfg(target_arch = "aarch64")]
use crate::sysregs::read_ctr_el0;
#[cfg(target_arch = "aarch64")]
use core::arch::asm;

/// Issues a full-system data synchronization barrier (`dsb sy`).
pub fn dsb_sy() {
    // SAFETY: `dsb` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("dsb sy", options(nostack));
    }
}

/// Waits for an interrupt.
pub fn wfi() {
    // SAFETY: `wfi` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("wfi", options(nomem, nostack, preserves_flags));
    }
}

/// Invalidates all EL1&0 TLB entries in the inner shareable domain.
pub fn tlbi_alle1is() {
    // SAFETY: `tlbi` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("tlbi alle1is", options(nostack));
    }
}

/// Invalidates all EL3 TLB entries in the inner shareable domain.
pub fn tlbi_alle3is() {
    // SAFETY: `tlbi` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("tlbi alle3is", options(nostack));
    }
}

/// Returns the size in bytes of the smallest data cache line, from `CTR_EL0.DminLine`.
#[cfg(target_arch = "aarch64")]
fn dcache_line_size() -> usize {
    4 << ((read_ctr_el0() >> 16) & 0xf)
}

/// Cleans and invalidates the data cache lines covering `size` bytes starting at `addr`, to the
/// point of coherency, then waits for the maintenance to complete.
pub fn flush_dcache_range(addr: usize, size: usize) {
    #[cfg(target_arch = "aarch64")]
    {
        let line = dcache_line_size();
        let end = addr + size;
        let mut line_addr = addr & !(line - 1);
        while line_addr < end {
            // SAFETY: Cleaning and invalidating a cache line writes back any dirty data and
            // doesn't change the contents of memory as observed by software.
            unsafe {
                asm!("dc civac, {addr}", addr = in(reg) line_addr, options(nostack));
            }
            line_addr += line;
        }
        dsb_sy();
    }
    #[cfg(not(target_arch = "aarch64"))]
    let _ = (addr, size);
}

/// Flushes the data cache lines covering `value`, so that observers without coherent caches see
/// its current contents.
pub fn flush_dcache<T: ?Sized>(value: &T) {
    flush_dcache_range((value as *const T).cast::<u8>() as usize, size_of_val(value));
}
