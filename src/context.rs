// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Per-core state and the saved register context of the lower ELs.

use crate::{
    platform::{Platform, PlatformImpl},
    smccc::SmcReturn,
};
use arm_sysregs::read_mpidr_el1;
use core::cell::RefCell;
use percore::{Cores, ExceptionLock, PerCore};

/// Per-core mutable state.
pub type PerCoreState<T> =
    PerCore<[ExceptionLock<RefCell<T>>; PlatformImpl::CORE_COUNT], CoresImpl>;

/// The security state a call came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum World {
    /// Secure world.
    Secure = 0,
    /// Normal world.
    NonSecure = 1,
}

/// Implementation of the `Cores` trait to get the index of the current CPU core.
pub struct CoresImpl;

// SAFETY: This implementation never returns the same index for different cores because
// `core_position` is guaranteed not to.
unsafe impl Cores for CoresImpl {
    fn core_index() -> usize {
        PlatformImpl::core_position(read_mpidr_el1().bits())
    }
}

/// AArch64 general purpose register context of a lower EL.
#[derive(Clone, Debug, Eq, PartialEq)]
#[repr(C, align(16))]
pub struct GpRegs {
    /// x0 to x30, and SP_EL0.
    pub registers: [u64; Self::COUNT],
}

impl GpRegs {
    /// The number of (64-bit) registers included in `GpRegs`.
    pub const COUNT: usize = 32;

    /// A context with every register zero.
    pub const EMPTY: Self = Self {
        registers: [0; Self::COUNT],
    };

    /// Writes the given return value to the general-purpose registers.
    ///
    /// Only as many registers as the return value uses are written, starting at x0.
    pub fn write_return_value(&mut self, value: &SmcReturn) {
        for (i, value) in value.values().iter().enumerate() {
            self.registers[i] = *value;
        }
    }
}

/// Registers used by EL3 to return to a lower EL.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct El3State {
    /// Where the lower EL will resume.
    pub elr_el3: u64,
    /// The PSTATE the lower EL will resume with.
    pub spsr_el3: u64,
}

/// The state of a core at the next lower EL in a given security state.
#[derive(Clone, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct CpuContext {
    /// General purpose registers.
    pub gpregs: GpRegs,
    /// Return state.
    pub el3_state: El3State,
    /// The EL0 stack pointer.
    pub sp_el0: u64,
    /// The EL1 stack pointer.
    pub sp_el1: u64,
}

impl CpuContext {
    /// A context with every register zero.
    pub const EMPTY: Self = Self {
        gpregs: GpRegs::EMPTY,
        el3_state: El3State {
            elr_el3: 0,
            spsr_el3: 0,
        },
        sp_el0: 0,
        sp_el1: 0,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_value_only_writes_used_registers() {
        let mut regs = GpRegs::EMPTY;
        regs.registers[..4].copy_from_slice(&[10, 11, 12, 13]);

        regs.write_return_value(&SmcReturn::from([1, 2]));
        assert_eq!(regs.registers[..4], [1, 2, 12, 13]);

        regs.write_return_value(&SmcReturn::EMPTY);
        assert_eq!(regs.registers[..4], [1, 2, 12, 13]);
    }

    #[test]
    fn core_index_from_mpidr() {
        // The fake MPIDR_EL1 reads as zero.
        assert_eq!(CoresImpl::core_index(), 0);
    }
}
