// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The NVG register interface to the MCE, and the encodings of its requests.

use crate::sysregs::{read_s3_0_c15_c1_3, read_s3_0_c15_c3_7, write_s3_0_c15_c1_2, write_s3_0_c15_c1_3};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// NVG channel ids, one per kind of request.
#[derive(Copy, Clone, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u64)]
pub enum NvgChannel {
    /// Reports the interface version, minor in the low word and major in the high word.
    Version = 0,
    /// Sets the expected wake time in TSC ticks for the next low-power state.
    WakeTime = 3,
    /// Updates the cluster, ccplex and system cstates and the wake mask.
    CstateInfo = 4,
    /// Selects which cstate statistic the next value query reads.
    CstateStatQueryRequest = 10,
    /// Reads the cstate statistic selected by the last query request.
    CstateStatQueryValue = 11,
    /// Requests a shutdown or reboot.
    Shutdown = 42,
    /// Reports whether the ccplex can enter SC7.
    IsSc7Allowed = 43,
    /// Wakes an offlined logical core.
    OnlineCore = 44,
    /// Configures cluster CC3.
    Cc3Ctrl = 45,
    /// Asks the MCE to reprogram one of the security carveouts of the ccplex.
    UpdateCcplexGsc = 50,
    /// Configures strict checking mode.
    SecurityConfig = 54,
}

/// Core cstates, as written to `ACTLR_EL1.PMSTATE`.
#[derive(Copy, Clone, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum CoreCstate {
    /// Running.
    C0 = 0,
    /// Clock gated.
    C1 = 1,
    /// Power gated, state retained by the MCE.
    C6 = 6,
    /// Powered off.
    C7 = 7,
}

/// Cluster cstate for cluster power down.
pub const CLUSTER_CC6: u32 = 6;
/// Ccplex cstate for ccplex power down.
pub const CCPLEX_CG7: u32 = 7;
/// System cstate for system suspend.
pub const SYSTEM_SC7: u32 = 7;

/// General security carveouts which the MCE can be asked to reprogram.
#[derive(Copy, Clone, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum GscIndex {
    /// The carveout protecting TZRAM.
    Tzram = 11,
    /// The carveout protecting TZDRAM.
    TzDram = 32,
    /// The video protection region. Also the highest valid index.
    Vpr = 35,
}

/// The value of a shutdown request which powers the system off.
pub const SHUTDOWN: u64 = 0;
/// The value of a shutdown request which reboots the system.
pub const REBOOT: u64 = 1;

/// Strict checking is enabled.
pub const STRICT_CHECKING_ENABLED: u64 = 1 << 0;
/// The strict checking configuration can't be changed any more.
pub const STRICT_CHECKING_LOCKED: u64 = 1 << 1;

const CLUSTER_CSTATE_MASK: u64 = 0x7;
const CLUSTER_CSTATE_UPDATE_BIT: u64 = 1 << 7;
const CCPLEX_CSTATE_MASK: u64 = 0x7;
const CCPLEX_CSTATE_SHIFT: u32 = 8;
const CCPLEX_CSTATE_UPDATE_BIT: u64 = 1 << 15;
const SYSTEM_CSTATE_MASK: u64 = 0xF;
const SYSTEM_CSTATE_SHIFT: u32 = 16;
const SYSTEM_CSTATE_UPDATE_BIT: u64 = 1 << 23;
const WAKE_MASK_UPDATE_BIT: u64 = 1 << 31;
const WAKE_MASK_SHIFT: u32 = 32;

/// An update to the cluster, ccplex and system cstates and the wake mask.
///
/// A zero cstate means "leave as it is"; any other value is sent with its update flag set.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CstateInfo {
    /// Cluster cstate, 3 bits.
    pub cluster: u32,
    /// Ccplex cstate, 3 bits.
    pub ccplex: u32,
    /// System cstate, 4 bits.
    pub system: u32,
    /// Whether the system state should be entered even if some wake events are pending.
    ///
    /// Only meaningful to older MCE firmware; not part of the packed word.
    pub system_state_force: bool,
    /// Events which wake the core.
    pub wake_mask: u32,
    /// Whether `wake_mask` should be applied.
    pub update_wake_mask: bool,
}

impl CstateInfo {
    /// Packs the update into the data word of a `CstateInfo` request.
    pub fn pack(&self) -> u64 {
        let mut value = 0;
        if self.cluster != 0 {
            value |= (u64::from(self.cluster) & CLUSTER_CSTATE_MASK) | CLUSTER_CSTATE_UPDATE_BIT;
        }
        if self.ccplex != 0 {
            value |= ((u64::from(self.ccplex) & CCPLEX_CSTATE_MASK) << CCPLEX_CSTATE_SHIFT)
                | CCPLEX_CSTATE_UPDATE_BIT;
        }
        if self.system != 0 {
            value |= ((u64::from(self.system) & SYSTEM_CSTATE_MASK) << SYSTEM_CSTATE_SHIFT)
                | SYSTEM_CSTATE_UPDATE_BIT;
        }
        if self.update_wake_mask {
            value |= WAKE_MASK_UPDATE_BIT;
        }
        value | (u64::from(self.wake_mask) << WAKE_MASK_SHIFT)
    }

    /// Recovers an update from a packed data word. Fields whose update flag is clear come back as
    /// zero.
    pub fn unpack(value: u64) -> Self {
        let field = |update_bit: u64, shift: u32, mask: u64| {
            if value & update_bit != 0 {
                ((value >> shift) & mask) as u32
            } else {
                0
            }
        };
        Self {
            cluster: field(CLUSTER_CSTATE_UPDATE_BIT, 0, CLUSTER_CSTATE_MASK),
            ccplex: field(CCPLEX_CSTATE_UPDATE_BIT, CCPLEX_CSTATE_SHIFT, CCPLEX_CSTATE_MASK),
            system: field(SYSTEM_CSTATE_UPDATE_BIT, SYSTEM_CSTATE_SHIFT, SYSTEM_CSTATE_MASK),
            system_state_force: false,
            wake_mask: (value >> WAKE_MASK_SHIFT) as u32,
            update_wake_mask: value & WAKE_MASK_UPDATE_BIT != 0,
        }
    }
}

/// Packs a cstate statistics query for `state` on `core`.
pub fn cstate_stat_query(state: u32, core: u32) -> u64 {
    (u64::from(state) << 16) | u64::from(core)
}

/// The NVG request/result register pair and the MCE cache maintenance register.
///
/// Every `get_result` must follow the matching request on the same core.
pub trait NvgInterface {
    /// Issues a request with no data.
    fn set_request(&self, channel: NvgChannel);

    /// Issues a request with a data word.
    fn set_request_data(&self, channel: NvgChannel, data: u64);

    /// Reads the result of the last request.
    fn get_result(&self) -> u64;

    /// Cleans and invalidates all ccplex caches and clears the TR bits. Returns zero on failure.
    fn cache_inval_all(&self) -> u64;
}

impl<T: NvgInterface + ?Sized> NvgInterface for &T {
    fn set_request(&self, channel: NvgChannel) {
        (**self).set_request(channel)
    }

    fn set_request_data(&self, channel: NvgChannel, data: u64) {
        (**self).set_request_data(channel, data)
    }

    fn get_result(&self) -> u64 {
        (**self).get_result()
    }

    fn cache_inval_all(&self) -> u64 {
        (**self).cache_inval_all()
    }
}

/// The NVG registers of the calling core.
#[derive(Debug)]
pub struct NvgRegisters;

impl NvgInterface for NvgRegisters {
    fn set_request(&self, channel: NvgChannel) {
        write_s3_0_c15_c1_2(channel.into());
    }

    fn set_request_data(&self, channel: NvgChannel, data: u64) {
        write_s3_0_c15_c1_2(channel.into());
        write_s3_0_c15_c1_3(data);
    }

    fn get_result(&self) -> u64 {
        read_s3_0_c15_c1_3()
    }

    fn cache_inval_all(&self) -> u64 {
        read_s3_0_c15_c3_7()
    }
}
