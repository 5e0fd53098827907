// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Tegra194 power management hooks, called by the PSCI implementation to move cores, clusters and
//! the SoC between power states through the MCE and the BPMP.

use crate::{
    aarch64::{flush_dcache, wfi},
    bpmp::{Bpmp, ChannelMemory, mrq::clock},
    context::PerCoreState,
    debug::STRICT_CHECKING,
    delay::Delay,
    error::Error,
    mce::{
        CORE_SLEEP_TIME_INFINITE, Mce, MceCommand,
        carmel::CoreRegisters,
        nvg::{CCPLEX_CG7, CLUSTER_CC6, CoreCstate, CstateInfo, NvgInterface, SYSTEM_SC7},
    },
    mmio::Mmio,
    platform::{Platform, PlatformImpl, exception_free},
};
use arm_psci::ErrorCode;
use arm_sysregs::{MpidrEl1, read_mpidr_el1};
use core::cell::RefCell;
use log::{error, warn};
use percore::{ExceptionLock, PerCore};

/// State id of a core idle request.
pub const PSTATE_ID_CORE_IDLE: u8 = 6;
/// State id of a core power down.
pub const PSTATE_ID_CORE_POWERDN: u8 = 7;
/// State id of a SoC power down, i.e. system suspend.
pub const PSTATE_ID_SOC_POWERDN: u8 = 2;

/// The local state of a running power domain.
pub const PSCI_LOCAL_STATE_RUN: u8 = 0;
/// The deepest retention state.
pub const PLAT_MAX_RET_STATE: u8 = 1;
/// The deepest power down state.
pub const PLAT_MAX_OFF_STATE: u8 = 8;

/// Power levels of the Tegra194 topology.
pub const MPIDR_AFFLVL1: usize = 1;
/// The system level.
pub const MPIDR_AFFLVL2: usize = 2;

const STATE_ID_MASK: u32 = 0xF;
const WAKE_TIME_MASK: u32 = 0x0FFF_FFF0;
const WAKE_TIME_SHIFT: u32 = 4;

/// Events which wake a core from idle.
const CORE_WAKE_MASK: u32 = 0x180c;

/// Offset of the security mode fuse in the fuse block.
pub const FUSE_SECURITY_MODE: usize = 0x1A0;
const ODM_PROD_FUSE_DISABLED: u32 = 0;

/// The BPMP services used across system suspend.
pub trait BpmpPower {
    /// Freezes the interface ahead of system suspend.
    fn suspend(&self);

    /// Waits for the BPMP to come back after system resume.
    fn resume(&self) -> Result<(), Error>;

    /// Enables clock `id`.
    fn enable_clock(&self, id: u32) -> Result<(), Error>;

    /// Disables clock `id`.
    fn disable_clock(&self, id: u32) -> Result<(), Error>;
}

impl<M: Mmio, C: ChannelMemory, D: Delay> BpmpPower for Bpmp<M, C, D> {
    fn suspend(&self) {
        Bpmp::suspend(self)
    }

    fn resume(&self) -> Result<(), Error> {
        Bpmp::resume(self)
    }

    fn enable_clock(&self, id: u32) -> Result<(), Error> {
        Bpmp::enable_clock(self, id)
    }

    fn disable_clock(&self, id: u32) -> Result<(), Error> {
        Bpmp::disable_clock(self, id)
    }
}

/// The Tegra194 power management hooks.
pub struct Tegra194Power<'a, N: NvgInterface, C: CoreRegisters, B: BpmpPower, F: Mmio> {
    mce: &'a Mce<N, C>,
    bpmp: &'a B,
    core: C,
    fuse: F,
    wake_times: PerCoreState<u32>,
}

impl<'a, N: NvgInterface, C: CoreRegisters, B: BpmpPower, F: Mmio> Tegra194Power<'a, N, C, B, F> {
    /// Creates the hooks. `core` must be the registers of the calling core, and `fuse` the fuse
    /// block.
    pub const fn new(mce: &'a Mce<N, C>, bpmp: &'a B, core: C, fuse: F) -> Self {
        Self {
            mce,
            bpmp,
            core,
            fuse,
            wake_times: PerCore::new(
                [const { ExceptionLock::new(RefCell::new(0)) }; PlatformImpl::CORE_COUNT],
            ),
        }
    }

    /// Returns the wake time last saved by the calling core.
    pub fn wake_time(&self) -> u32 {
        exception_free(|token| *self.wake_times.get().borrow(token).borrow())
    }

    fn enter_cstate(&self, state: CoreCstate, wake_time: u32) {
        if let Err(e) = self.mce.command_handler(
            MceCommand::EnterCstate.into(),
            u64::from(u32::from(state)),
            u64::from(wake_time),
            0,
        ) {
            error!("Failed to enter {state:?}: {e}");
        }
    }

    fn update_cstate_info(&self, info: &CstateInfo) {
        if let Err(e) = self.mce.update_cstate_info(info) {
            error!("Failed to update cstate info {info:?}: {e}");
        }
    }

    /// Checks a CPU_SUSPEND power state, saving its wake time for the calling core.
    ///
    /// Returns the local state the core should enter; its cluster stays running.
    pub fn validate_power_state(&self, power_state: u32) -> Result<u8, ErrorCode> {
        let wake_time = (power_state & WAKE_TIME_MASK) << WAKE_TIME_SHIFT;
        exception_free(|token| {
            let cell = self.wake_times.get().borrow(token);
            *cell.borrow_mut() = wake_time;
            // Read with the caches off on the way into the power state.
            flush_dcache(cell);
        });

        match (power_state & STATE_ID_MASK) as u8 {
            PSTATE_ID_CORE_IDLE => Ok(PLAT_MAX_RET_STATE),
            state_id => {
                warn!("Unsupported power state id {state_id}");
                Err(ErrorCode::InvalidParameters)
            }
        }
    }

    /// Puts the calling core in standby until its saved wake time or a wake event.
    pub fn cpu_standby(&self) -> Result<(), ErrorCode> {
        self.update_cstate_info(&CstateInfo {
            wake_mask: CORE_WAKE_MASK,
            update_wake_mask: true,
            ..Default::default()
        });
        self.enter_cstate(CoreCstate::C6, self.wake_time());
        Ok(())
    }

    /// Prepares the power down of the calling core, with `state_id` being the state of the
    /// highest power level.
    ///
    /// For a SoC power down this waits until the MCE allows SC7, then freezes the BPMP interface.
    pub fn pwr_domain_suspend(&self, state_id: u8) -> Result<(), ErrorCode> {
        if state_id & STATE_ID_MASK as u8 != PSTATE_ID_SOC_POWERDN {
            return Ok(());
        }

        self.update_cstate_info(&CstateInfo {
            cluster: CLUSTER_CC6,
            ccplex: CCPLEX_CG7,
            system: SYSTEM_SC7,
            system_state_force: true,
            update_wake_mask: true,
            ..Default::default()
        });

        loop {
            match self.mce.is_sc7_allowed() {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to query SC7 entry: {e}");
                    break;
                }
            }
        }

        self.enter_cstate(CoreCstate::C7, CORE_SLEEP_TIME_INFINITE);
        self.bpmp.suspend();
        Ok(())
    }

    /// Returns the state which power level `level` should enter, given the states requested by
    /// the cores below it.
    pub fn get_target_pwr_state(&self, level: usize, states: &[u8]) -> u8 {
        let mpidr = read_mpidr_el1();
        match level {
            MPIDR_AFFLVL1 => {
                let cpu = usize::from(mpidr.aff0());
                self.cluster_target_state(cpu, states)
            }
            MPIDR_AFFLVL2 => {
                let cpu = PlatformImpl::core_position(mpidr.bits());
                match states.get(cpu) {
                    Some(&PSTATE_ID_SOC_POWERDN) => PSTATE_ID_SOC_POWERDN,
                    _ => PSCI_LOCAL_STATE_RUN,
                }
            }
            _ => PSCI_LOCAL_STATE_RUN,
        }
    }

    fn cluster_target_state(&self, cpu: usize, states: &[u8]) -> u8 {
        let Some(&target) = states.get(cpu) else {
            return PSCI_LOCAL_STATE_RUN;
        };

        if target == PSTATE_ID_CORE_POWERDN {
            self.update_cstate_info(&CstateInfo {
                wake_mask: CORE_WAKE_MASK,
                update_wake_mask: true,
                ..Default::default()
            });
            target
        } else if target == PLAT_MAX_OFF_STATE {
            if states.iter().all(|&state| state == PLAT_MAX_OFF_STATE) {
                // Last core of the cluster going down.
                self.update_cstate_info(&CstateInfo {
                    cluster: CLUSTER_CC6,
                    ccplex: CCPLEX_CG7,
                    system_state_force: true,
                    update_wake_mask: true,
                    ..Default::default()
                });
                target
            } else {
                self.update_cstate_info(&CstateInfo {
                    update_wake_mask: true,
                    ..Default::default()
                });
                PSCI_LOCAL_STATE_RUN
            }
        } else {
            target
        }
    }

    /// Asks the MCE to bring up the core `mpidr`.
    pub fn pwr_domain_on(&self, mpidr: MpidrEl1) -> Result<(), ErrorCode> {
        let cluster = u32::from(mpidr.aff1());
        if cluster as usize >= PlatformImpl::CLUSTER_COUNT {
            error!("Wrong cluster id {cluster} for MPIDR {:#x}", mpidr.bits());
            return Err(ErrorCode::NotPresent);
        }

        let target = u32::from(mpidr.aff0()) + cluster * 2;
        if let Err(e) = self.mce.command_handler(
            MceCommand::OnlineCore.into(),
            u64::from(target),
            0,
            0,
        ) {
            error!("Failed to online core {target}: {e}");
        }
        Ok(())
    }

    /// Restores the SoC state after the calling core powers up from `state_id`.
    ///
    /// The core's next `wfi` is reset to C1: the deeper state chosen when it went down is up to
    /// the normal world to request again.
    pub fn pwr_domain_on_finish(&self, state_id: u8) -> Result<(), ErrorCode> {
        self.core.set_pmstate(CoreCstate::C1.into());

        if state_id != PSTATE_ID_SOC_POWERDN {
            return Ok(());
        }

        if self.bpmp.resume().is_err() {
            return Err(ErrorCode::InternalFailure);
        }

        if STRICT_CHECKING {
            if let Err(e) = self.mce.enable_strict_checking() {
                error!("Failed to enable strict checking: {e}");
            }
        }

        self.configure_uncore_perfmon()
    }

    /// Lets the normal world use the uncore performance monitors on non-production parts.
    fn configure_uncore_perfmon(&self) -> Result<(), ErrorCode> {
        self.bpmp.enable_clock(clock::FUSE).map_err(|e| {
            error!("Failed to enable the fuse clock: {e}");
            ErrorCode::InternalFailure
        })?;
        if self.fuse.read_32(FUSE_SECURITY_MODE) == ODM_PROD_FUSE_DISABLED {
            self.core.enable_uncore_perfmon();
        }
        self.bpmp.disable_clock(clock::FUSE).map_err(|e| {
            error!("Failed to disable the fuse clock: {e}");
            ErrorCode::InternalFailure
        })
    }

    /// Powers the calling core off on its next `wfi`.
    pub fn pwr_domain_off(&self) -> Result<(), ErrorCode> {
        self.enter_cstate(CoreCstate::C7, CORE_SLEEP_TIME_INFINITE);
        Ok(())
    }

    /// Asks the MCE to power the system off.
    pub fn prepare_system_off(&self) -> Result<(), ErrorCode> {
        self.mce.system_shutdown().map_err(|e| {
            error!("Failed to request system off: {e}");
            ErrorCode::InternalFailure
        })
    }

    /// Powers the system off.
    ///
    /// Panics if the MCE refuses the request, rather than waiting for a power off that won't come.
    pub fn system_off(&self) -> ! {
        if let Err(e) = self.prepare_system_off() {
            panic!("System off failed: {e:?}");
        }
        loop {
            wfi();
        }
    }

    /// Asks the MCE to reboot the system.
    pub fn system_reset(&self) -> Result<(), ErrorCode> {
        self.mce.system_reboot().map_err(|e| {
            error!("Failed to request system reset: {e}");
            ErrorCode::InternalFailure
        })
    }
}
