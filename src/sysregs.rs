// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! System registers which `arm_sysregs` doesn't provide: the Carmel implementation-defined
//! registers, the NVG interface to the MCE and the secure physical timer.
//!
//! The NVG registers are named by their encodings: `s3_0_c15_c1_2` selects the channel of a
//! request, `s3_0_c15_c1_3` carries its data and result, and reading `s3_0_c15_c3_7` makes the MCE
//! clean and invalidate the ccplex caches.

use arm_sysregs::{read_sysreg, read_write_sysreg, write_sysreg};
use bitflags::bitflags;

bitflags! {
    /// Control bits of a generic timer.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TimerControl: u64 {
        /// Enables the timer.
        const ENABLE = 1 << 0;
        /// Masks the timer interrupt.
        const IMASK = 1 << 1;
    }
}

read_write_sysreg!(actlr_el1, u64, safe_read, safe_write, fake::SYSREGS);
read_write_sysreg!(actlr_el3, u64, safe_read, safe_write, fake::SYSREGS);
read_sysreg!(id_afr0_el1, u64, safe, fake::SYSREGS);
read_sysreg!(ctr_el0, u64, safe, fake::SYSREGS);

read_sysreg!(cntps_tval_el1, u64, safe, fake::SYSREGS);
write_sysreg!(cntps_ctl_el1, u64: TimerControl, safe, fake::SYSREGS);

write_sysreg!(s3_0_c15_c1_2, u64, safe, fake::SYSREGS);
read_write_sysreg!(s3_0_c15_c1_3, u64, safe_read, safe_write, fake::SYSREGS);
read_sysreg!(s3_0_c15_c3_7, u64, safe, fake::SYSREGS);
