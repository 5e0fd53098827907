// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! RF-A for NVIDIA Tegra: SMC dispatch and BPMP/MCE power coordination at EL3.
//!
//! The crate routes Secure Monitor Calls to the architecture, standard and Tegra SiP services,
//! and drives the two auxiliary power controllers found on Tegra SoCs: the BPMP co-processor,
//! reached through a semaphore-guarded shared-memory mailbox, and the MCE, reached through the
//! NVG system register pair.

#![cfg_attr(not(test), no_std)]

pub mod aarch64;
pub mod bpmp;
pub mod context;
pub mod debug;
pub mod delay;
pub mod error;
pub mod gicv2;
pub mod logger;
pub mod mce;
pub mod mmio;
pub mod platform;
pub mod power;
pub mod services;
pub mod smccc;
pub mod sysregs;
