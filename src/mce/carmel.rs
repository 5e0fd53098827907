// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Implementation-defined system registers of the Carmel cores which take part in MCE requests.

use crate::{
    aarch64::{dsb_sy, tlbi_alle1is, tlbi_alle3is},
    sysregs::{read_actlr_el1, read_actlr_el3, read_id_afr0_el1, write_actlr_el1, write_actlr_el3},
};
use arm_sysregs::{SctlrEl3, read_sctlr_el3};

const ACTLR_EL1_PMSTATE_MASK: u64 = 0xF;
const ID_AFR0_EL1_CACHE_OPS_SHIFT: u64 = 12;
const ID_AFR0_EL1_CACHE_OPS_MASK: u64 = 0xF;
const ACTLR_EL3_ENABLE_MDCR_EL3_SPME: u64 = 1 << 6;

/// Core registers used around MCE requests.
pub trait CoreRegisters {
    /// Sets the power state the core enters on its next `wfi`, in `ACTLR_EL1.PMSTATE`.
    fn set_pmstate(&self, state: u32);

    /// Returns whether the MCE cache maintenance registers are implemented, from `ID_AFR0_EL1`.
    fn cache_ops_supported(&self) -> bool;

    /// Returns whether the EL3 MMU is on.
    fn mmu_enabled(&self) -> bool;

    /// Invalidates all EL1 and EL3 TLB entries in the inner shareable domain, and waits for it.
    fn invalidate_tlbs(&self);

    /// Lets `MDCR_EL3.SPME` enable the uncore performance monitors.
    fn enable_uncore_perfmon(&self);
}

impl<T: CoreRegisters + ?Sized> CoreRegisters for &T {
    fn set_pmstate(&self, state: u32) {
        (**self).set_pmstate(state)
    }

    fn cache_ops_supported(&self) -> bool {
        (**self).cache_ops_supported()
    }

    fn mmu_enabled(&self) -> bool {
        (**self).mmu_enabled()
    }

    fn invalidate_tlbs(&self) {
        (**self).invalidate_tlbs()
    }

    fn enable_uncore_perfmon(&self) {
        (**self).enable_uncore_perfmon()
    }
}

/// The registers of the calling Carmel core.
#[derive(Debug)]
pub struct CarmelRegisters;

impl CoreRegisters for CarmelRegisters {
    fn set_pmstate(&self, state: u32) {
        let actlr = read_actlr_el1() & !ACTLR_EL1_PMSTATE_MASK;
        write_actlr_el1(actlr | u64::from(state));
    }

    fn cache_ops_supported(&self) -> bool {
        (read_id_afr0_el1() >> ID_AFR0_EL1_CACHE_OPS_SHIFT) & ID_AFR0_EL1_CACHE_OPS_MASK == 1
    }

    fn mmu_enabled(&self) -> bool {
        read_sctlr_el3().contains(SctlrEl3::M)
    }

    fn invalidate_tlbs(&self) {
        tlbi_alle1is();
        tlbi_alle3is();
        dsb_sy();
    }

    fn enable_uncore_perfmon(&self) {
        write_actlr_el3(read_actlr_el3() | ACTLR_EL3_ENABLE_MDCR_EL3_SPME);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::sysregs::fake::SYSREGS;

    #[test]
    fn carmel_registers() {
        SYSREGS.lock().unwrap().actlr_el1 = 0x1234_0007;
        CarmelRegisters.set_pmstate(1);
        assert_eq!(SYSREGS.lock().unwrap().actlr_el1, 0x1234_0001);

        SYSREGS.lock().unwrap().id_afr0_el1 = 0x1000;
        assert!(CarmelRegisters.cache_ops_supported());
        SYSREGS.lock().unwrap().id_afr0_el1 = 0x2000;
        assert!(!CarmelRegisters.cache_ops_supported());

        SYSREGS.lock().unwrap().actlr_el3 = 0x3;
        CarmelRegisters.enable_uncore_perfmon();
        assert_eq!(SYSREGS.lock().unwrap().actlr_el3, 0x43);
    }
}
