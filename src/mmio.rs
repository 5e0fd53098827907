// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Typed access to blocks of memory-mapped control registers.

/// A block of memory-mapped registers, addressed by byte offset from the start of the block.
///
/// Implementations only move values to and from the device; they never interpret them.
pub trait Mmio {
    /// Reads the 32-bit register at `offset`.
    fn read_32(&self, offset: usize) -> u32;

    /// Writes `value` to the 32-bit register at `offset`.
    fn write_32(&self, offset: usize, value: u32);

    /// Writes `value` to the byte-wide register at `offset`.
    fn write_8(&self, offset: usize, value: u8);

    /// Sets the bits of `mask` in the 32-bit register at `offset` with a read-modify-write.
    fn set_bits_32(&self, offset: usize, mask: u32) {
        let value = self.read_32(offset);
        self.write_32(offset, value | mask);
    }

    /// Clears the bits of `mask` in the 32-bit register at `offset` with a read-modify-write.
    fn clear_bits_32(&self, offset: usize, mask: u32) {
        let value = self.read_32(offset);
        self.write_32(offset, value & !mask);
    }
}

impl<T: Mmio + ?Sized> Mmio for &T {
    fn read_32(&self, offset: usize) -> u32 {
        (**self).read_32(offset)
    }

    fn write_32(&self, offset: usize, value: u32) {
        (**self).write_32(offset, value)
    }

    fn write_8(&self, offset: usize, value: u8) {
        (**self).write_8(offset, value)
    }
}

/// A register block at a fixed physical address, accessed with volatile loads and stores.
#[derive(Debug)]
pub struct MmioRegion {
    base: usize,
}

impl MmioRegion {
    /// Creates an accessor for the register block starting at physical address `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the identity-mapped address of a device register block which is mapped as
    /// device memory for as long as the returned value is used, and every offset later passed to
    /// the accessors must be a valid, suitably aligned register of that block. Accesses through
    /// the returned value must not conflict with any other driver of the same block.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// Returns the physical base address of the block.
    pub const fn base(&self) -> usize {
        self.base
    }
}

impl Mmio for MmioRegion {
    fn read_32(&self, offset: usize) -> u32 {
        // SAFETY: The caller of `MmioRegion::new` promised that `base + offset` is a valid,
        // aligned, mapped device register.
        unsafe { ((self.base + offset) as *const u32).read_volatile() }
    }

    fn write_32(&self, offset: usize, value: u32) {
        // SAFETY: The caller of `MmioRegion::new` promised that `base + offset` is a valid,
        // aligned, mapped device register.
        unsafe { ((self.base + offset) as *mut u32).write_volatile(value) }
    }

    fn write_8(&self, offset: usize, value: u8) {
        // SAFETY: The caller of `MmioRegion::new` promised that `base + offset` is a valid, mapped
        // device register.
        unsafe { ((self.base + offset) as *mut u8).write_volatile(value) }
    }
}
