// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Arm architecture SMCs.

use crate::{
    platform::{Platform, PlatformImpl},
    services::{Service, owns},
    smccc::{NOT_REQUIRED, OwningEntityNumber, SMC_UNK, SUCCESS, SmcCall, SmcReturn},
};
use log::warn;

/// Function ID of SMCCC_VERSION.
pub const SMCCC_VERSION: u32 = 0x8000_0000;
const SMCCC_ARCH_FEATURES: u32 = 0x8000_0001;
const SMCCC_ARCH_WORKAROUND_1: u32 = 0x8000_8000;
const SMCCC_ARCH_WORKAROUND_2: u32 = 0x8000_7FFF;

/// SMCCC version 1.1.
pub const SMCCC_VERSION_1_1: i32 = 0x0001_0001;

/// Arm architecture SMCs.
#[derive(Debug)]
pub struct Arch;

impl Service for Arch {
    owns!(OwningEntityNumber::ARM_ARCHITECTURE);

    fn handle(&self, call: &SmcCall) -> SmcReturn {
        match call.function.0 {
            SMCCC_VERSION => SMCCC_VERSION_1_1.into(),
            SMCCC_ARCH_FEATURES => arch_features(call.arg(1) as u32).into(),
            // The mitigations are applied on every entry to EL3, so there is nothing left to do.
            SMCCC_ARCH_WORKAROUND_1 | SMCCC_ARCH_WORKAROUND_2 => SUCCESS.into(),
            _ => {
                warn!("Unimplemented arch SMC {}", call.function);
                SMC_UNK.into()
            }
        }
    }
}

/// Whether a workaround is needed on this platform, as reported by SMCCC_ARCH_FEATURES.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum WorkaroundSupport {
    /// The workaround is needed and implemented.
    Required = 0,
    /// The workaround is implemented but not needed.
    SafeButNotRequired = 1,
    /// The workaround is not needed, so calling it is pointless.
    NotRequired = NOT_REQUIRED,
}

fn arch_features(arch_func_id: u32) -> i32 {
    match arch_func_id {
        SMCCC_VERSION | SMCCC_ARCH_FEATURES => SUCCESS,
        SMCCC_ARCH_WORKAROUND_1 => PlatformImpl::arch_workaround_1_supported() as i32,
        SMCCC_ARCH_WORKAROUND_2 => PlatformImpl::arch_workaround_2_supported() as i32,
        _ => SMC_UNK,
    }
}
