// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Driver for the MCE, the power management microcontroller of the Tegra194 ccplex.
//!
//! Requests go through the NVG registers of the calling core and complete synchronously. Some
//! pre-silicon platforms don't run MCE firmware at all, in which case every request fails with
//! [`Error::InvalidArgument`] without touching the registers.

pub mod carmel;
pub mod nvg;

use self::{
    carmel::CoreRegisters,
    nvg::{
        CoreCstate, CstateInfo, GscIndex, NvgChannel, NvgInterface, REBOOT, SHUTDOWN,
        STRICT_CHECKING_ENABLED, STRICT_CHECKING_LOCKED, cstate_stat_query,
    },
};
use crate::{
    error::Error,
    platform::{ChipInfo, Platform, PlatformImpl},
};
use log::{error, info};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The major version of the NVG interface this driver speaks.
pub const NVG_VERSION_MAJOR: u32 = 6;
/// The oldest minor version of the NVG interface this driver works with.
pub const NVG_VERSION_MINOR: u32 = 4;

/// Wake time meaning "no timed wake up".
pub const CORE_SLEEP_TIME_INFINITE: u32 = 0xFFFF_FFFF;

const CORE_ID_MASK: u32 = 0xF;

/// MCE commands which the normal world may issue through the SiP service.
#[derive(Copy, Clone, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u64)]
pub enum MceCommand {
    /// Enter a core cstate. Arguments: state, wake time.
    EnterCstate = 0,
    /// Ask whether the system may enter SC7.
    IsSc7Allowed = 5,
    /// Wake an offlined core. Argument: logical core id.
    OnlineCore = 6,
}

/// The MCE, as seen from the calling core.
#[derive(Debug)]
pub struct Mce<N: NvgInterface, C: CoreRegisters> {
    nvg: N,
    core: C,
    chip: ChipInfo,
}

impl<N: NvgInterface, C: CoreRegisters> Mce<N, C> {
    /// Creates a driver talking through `nvg`, on a chip identified as `chip`.
    pub const fn new(nvg: N, core: C, chip: ChipInfo) -> Self {
        Self { nvg, core, chip }
    }

    /// Returns whether MCE firmware is running on this platform.
    pub fn firmware_supported(&self) -> bool {
        !(self.chip.is_linsim() || self.chip.is_qt() || self.chip.is_virt_dev_kit())
    }

    fn check_firmware(&self) -> Result<(), Error> {
        if self.firmware_supported() {
            Ok(())
        } else {
            Err(Error::InvalidArgument)
        }
    }

    /// Checks that the MCE firmware speaks a compatible version of the NVG interface.
    ///
    /// Panics if it doesn't, as nothing else would work reliably.
    pub fn verify_firmware_version(&self) {
        if !self.firmware_supported() {
            return;
        }

        self.nvg.set_request(NvgChannel::Version);
        let version = self.nvg.get_result();
        let minor = version as u32;
        let major = (version >> 32) as u32;

        info!(
            "MCE Version - HW={major}:{minor}, SW={NVG_VERSION_MAJOR}:{NVG_VERSION_MINOR}"
        );

        if major != NVG_VERSION_MAJOR {
            panic!("MCE major version mismatch: {major} != {NVG_VERSION_MAJOR}");
        }
        if minor < NVG_VERSION_MINOR {
            panic!("MCE minor version mismatch: {minor} < {NVG_VERSION_MINOR}");
        }
    }

    /// Handles an MCE command from the normal world, returning the value for x0.
    pub fn command_handler(&self, cmd: u64, arg0: u64, arg1: u64, _arg2: u64) -> Result<u64, Error> {
        self.check_firmware()?;

        let Ok(command) = MceCommand::try_from(cmd) else {
            error!("Unknown MCE command {cmd}");
            return Err(Error::InvalidArgument);
        };

        let result = match command {
            MceCommand::EnterCstate => self.enter_cstate(arg0 as u32, arg1 as u32).map(|()| 0),
            MceCommand::IsSc7Allowed => self.is_sc7_allowed().map(u64::from),
            MceCommand::OnlineCore => self.online_core(arg0 as u32).map(|()| 0),
        };
        if let Err(e) = result {
            error!("MCE command {command:?} failed: {e}");
        }
        result
    }

    /// Sets the wake time and makes the core enter `state` on its next `wfi`.
    pub fn enter_cstate(&self, state: u32, wake_time: u32) -> Result<(), Error> {
        self.check_firmware()?;
        let Ok(state) = CoreCstate::try_from(state) else {
            error!("Unknown cstate {state}");
            return Err(Error::InvalidArgument);
        };

        self.nvg
            .set_request_data(NvgChannel::WakeTime, u64::from(wake_time));
        self.core.set_pmstate(state.into());
        Ok(())
    }

    /// Updates the cluster, ccplex and system cstates and the wake mask.
    pub fn update_cstate_info(&self, info: &CstateInfo) -> Result<(), Error> {
        self.check_firmware()?;
        self.nvg.set_request_data(NvgChannel::CstateInfo, info.pack());
        Ok(())
    }

    /// Returns whether the ccplex may enter SC7 now.
    pub fn is_sc7_allowed(&self) -> Result<bool, Error> {
        self.check_firmware()?;
        self.nvg.set_request(NvgChannel::IsSc7Allowed);
        Ok(self.nvg.get_result() != 0)
    }

    /// Wakes the offlined logical core `core`.
    pub fn online_core(&self, core: u32) -> Result<(), Error> {
        self.check_firmware()?;
        if core as usize >= PlatformImpl::CORE_COUNT {
            error!("Unknown core id {core}");
            return Err(Error::InvalidArgument);
        }
        self.nvg
            .set_request_data(NvgChannel::OnlineCore, u64::from(core & CORE_ID_MASK));
        Ok(())
    }

    /// Asks the MCE to reprogram the carveout with the given raw index.
    pub fn update_ccplex_gsc(&self, index: u32) -> Result<(), Error> {
        self.check_firmware()?;
        if index > u32::from(GscIndex::Vpr) {
            error!("Unknown GSC index {index}");
            return Err(Error::InvalidArgument);
        }
        self.nvg
            .set_request_data(NvgChannel::UpdateCcplexGsc, u64::from(index));
        Ok(())
    }

    /// Asks the MCE to reprogram the video protection region.
    pub fn update_gsc_videomem(&self) -> Result<(), Error> {
        self.update_ccplex_gsc(GscIndex::Vpr.into())
    }

    /// Asks the MCE to reprogram the TZDRAM carveout.
    pub fn update_gsc_tzdram(&self) -> Result<(), Error> {
        self.update_ccplex_gsc(GscIndex::TzDram.into())
    }

    /// Asks the MCE to reprogram the TZRAM carveout.
    pub fn update_gsc_tzram(&self) -> Result<(), Error> {
        self.update_ccplex_gsc(GscIndex::Tzram.into())
    }

    /// Reads the statistics counter of `state` on `core`.
    pub fn read_cstate_stats(&self, state: u32, core: u32) -> Result<u64, Error> {
        self.check_firmware()?;
        self.nvg.set_request_data(
            NvgChannel::CstateStatQueryRequest,
            cstate_stat_query(state, core),
        );
        self.nvg.set_request(NvgChannel::CstateStatQueryValue);
        Ok(self.nvg.get_result())
    }

    /// Turns on strict checking of memory accesses against the security carveouts.
    ///
    /// TZRAM and TZDRAM must already be set up. This only does anything on silicon and FPGA.
    pub fn enable_strict_checking(&self) -> Result<(), Error> {
        self.check_firmware()?;
        if !(self.chip.is_silicon() || self.chip.is_fpga()) {
            return Ok(());
        }

        if self.core.mmu_enabled() {
            self.core.invalidate_tlbs();
        }

        if let Err(e) = self.clean_cache_trbits() {
            error!("Flushing caches and TR bits failed: {e}");
            return Err(e);
        }

        self.nvg.set_request_data(
            NvgChannel::SecurityConfig,
            STRICT_CHECKING_ENABLED | STRICT_CHECKING_LOCKED,
        );
        Ok(())
    }

    fn clean_cache_trbits(&self) -> Result<(), Error> {
        if !self.core.cache_ops_supported() {
            return Err(Error::InvalidArgument);
        }
        if self.nvg.cache_inval_all() == 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    /// Asks the MCE to power the system off.
    pub fn system_shutdown(&self) -> Result<(), Error> {
        self.check_firmware()?;
        self.nvg.set_request_data(NvgChannel::Shutdown, SHUTDOWN);
        Ok(())
    }

    /// Asks the MCE to reboot the system.
    pub fn system_reboot(&self) -> Result<(), Error> {
        self.check_firmware()?;
        self.nvg.set_request_data(NvgChannel::Shutdown, REBOOT);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::carmel::fake::FakeCore;
    use super::nvg::fake::{FakeNvg, Request};
    use super::*;
    use crate::platform::TegraPlatform;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    pub fn silicon() -> ChipInfo {
        ChipInfo {
            chip_id: ChipInfo::TEGRA194,
            major: 1,
            minor: 0,
            platform: TegraPlatform::Silicon,
        }
    }

    pub fn chip(platform: TegraPlatform) -> ChipInfo {
        ChipInfo {
            platform,
            ..silicon()
        }
    }

    fn mce<'a>(nvg: &'a FakeNvg, core: &'a FakeCore) -> Mce<&'a FakeNvg, &'a FakeCore> {
        Mce::new(nvg, core, silicon())
    }

    #[test]
    fn version_accepted() {
        let nvg = FakeNvg::with_results(&[(6 << 32) | 4]);
        let core = FakeCore::default();
        mce(&nvg, &core).verify_firmware_version();
        assert_eq!(nvg.requests(), [Request::Plain(NvgChannel::Version)]);

        let nvg = FakeNvg::with_results(&[(6 << 32) | 9]);
        mce(&nvg, &core).verify_firmware_version();
    }

    #[test]
    #[should_panic(expected = "MCE major version mismatch")]
    fn lower_major_version_panics() {
        let nvg = FakeNvg::with_results(&[(5 << 32) | 4]);
        let core = FakeCore::default();
        mce(&nvg, &core).verify_firmware_version();
    }

    #[test]
    fn higher_major_or_older_minor_panics() {
        let core = FakeCore::default();
        for version in [(7 << 32) | 4, (6 << 32) | 3] {
            let nvg = FakeNvg::with_results(&[version]);
            let mce = mce(&nvg, &core);
            let result = catch_unwind(AssertUnwindSafe(|| mce.verify_firmware_version()));
            assert!(result.is_err(), "version {version:#x} accepted");
        }
    }

    #[test]
    fn version_check_skipped_without_firmware() {
        let nvg = FakeNvg::default();
        let core = FakeCore::default();
        Mce::new(&nvg, &core, chip(TegraPlatform::VirtDevKit)).verify_firmware_version();
        assert!(nvg.requests().is_empty());
    }

    #[test]
    fn firmware_support_by_platform() {
        let nvg = FakeNvg::default();
        let core = FakeCore::default();
        for (platform, supported) in [
            (TegraPlatform::Silicon, true),
            (TegraPlatform::Fpga, true),
            (TegraPlatform::Qt, false),
            (TegraPlatform::Linsim, false),
            (TegraPlatform::UnitFpga, false),
            (TegraPlatform::VirtDevKit, false),
        ] {
            let mce = Mce::new(&nvg, &core, chip(platform));
            assert_eq!(mce.firmware_supported(), supported, "{platform:?}");
        }
    }

    #[test]
    fn nothing_sent_without_firmware() {
        let nvg = FakeNvg::with_results(&[1]);
        let core = FakeCore::default();
        let mce = Mce::new(&nvg, &core, chip(TegraPlatform::Linsim));

        assert_eq!(mce.enter_cstate(6, 100), Err(Error::InvalidArgument));
        assert_eq!(mce.is_sc7_allowed(), Err(Error::InvalidArgument));
        assert_eq!(mce.online_core(1), Err(Error::InvalidArgument));
        assert_eq!(mce.update_gsc_videomem(), Err(Error::InvalidArgument));
        assert_eq!(
            mce.update_cstate_info(&CstateInfo::default()),
            Err(Error::InvalidArgument)
        );
        assert_eq!(mce.read_cstate_stats(7, 0), Err(Error::InvalidArgument));
        assert_eq!(mce.enable_strict_checking(), Err(Error::InvalidArgument));
        assert_eq!(mce.system_shutdown(), Err(Error::InvalidArgument));
        assert_eq!(
            mce.command_handler(MceCommand::IsSc7Allowed.into(), 0, 0, 0),
            Err(Error::InvalidArgument)
        );
        assert!(nvg.requests().is_empty());
        assert_eq!(core.pmstate(), None);
    }

    #[test]
    fn enter_cstate() {
        let nvg = FakeNvg::default();
        let core = FakeCore::default();
        let mce = mce(&nvg, &core);

        assert_eq!(mce.enter_cstate(7, CORE_SLEEP_TIME_INFINITE), Ok(()));
        assert_eq!(
            nvg.requests(),
            [Request::Data(NvgChannel::WakeTime, 0xFFFF_FFFF)]
        );
        assert_eq!(core.pmstate(), Some(7));
    }

    #[test]
    fn invalid_cstate_rejected() {
        let nvg = FakeNvg::default();
        let core = FakeCore::default();
        let mce = mce(&nvg, &core);

        for state in [2, 3, 5, 8, u32::MAX] {
            assert_eq!(mce.enter_cstate(state, 0), Err(Error::InvalidArgument));
        }
        assert!(nvg.requests().is_empty());
        assert_eq!(core.pmstate(), None);
    }

    #[test]
    fn online_core_range() {
        let nvg = FakeNvg::default();
        let core = FakeCore::default();
        let mce = mce(&nvg, &core);

        assert_eq!(mce.online_core(7), Ok(()));
        assert_eq!(
            mce.online_core(PlatformImpl::CORE_COUNT as u32),
            Err(Error::InvalidArgument)
        );
        assert_eq!(mce.online_core(0x13), Err(Error::InvalidArgument));
        assert_eq!(nvg.requests(), [Request::Data(NvgChannel::OnlineCore, 7)]);
    }

    #[test]
    fn gsc_updates() {
        let nvg = FakeNvg::default();
        let core = FakeCore::default();
        let mce = mce(&nvg, &core);

        assert_eq!(mce.update_gsc_videomem(), Ok(()));
        assert_eq!(mce.update_gsc_tzdram(), Ok(()));
        assert_eq!(mce.update_gsc_tzram(), Ok(()));
        assert_eq!(mce.update_ccplex_gsc(36), Err(Error::InvalidArgument));
        assert_eq!(
            nvg.requests(),
            [
                Request::Data(NvgChannel::UpdateCcplexGsc, 35),
                Request::Data(NvgChannel::UpdateCcplexGsc, 32),
                Request::Data(NvgChannel::UpdateCcplexGsc, 11),
            ]
        );
    }

    #[test]
    fn cstate_info_and_stats() {
        let nvg = FakeNvg::with_results(&[1234]);
        let core = FakeCore::default();
        let mce = mce(&nvg, &core);

        let info = CstateInfo {
            cluster: 3,
            ..Default::default()
        };
        assert_eq!(mce.update_cstate_info(&info), Ok(()));
        assert_eq!(mce.read_cstate_stats(7, 2), Ok(1234));
        assert_eq!(
            nvg.requests(),
            [
                Request::Data(NvgChannel::CstateInfo, 0x83),
                Request::Data(NvgChannel::CstateStatQueryRequest, 0x0007_0002),
                Request::Plain(NvgChannel::CstateStatQueryValue),
            ]
        );
    }

    #[test]
    fn command_handler_dispatch() {
        let nvg = FakeNvg::with_results(&[1, 0]);
        let core = FakeCore::default();
        let mce = mce(&nvg, &core);

        assert_eq!(mce.command_handler(5, 0, 0, 0), Ok(1));
        assert_eq!(mce.command_handler(5, 0, 0, 0), Ok(0));
        assert_eq!(mce.command_handler(0, 6, 1000, 0), Ok(0));
        assert_eq!(core.pmstate(), Some(6));
        assert_eq!(mce.command_handler(6, 3, 0, 0), Ok(0));
        assert_eq!(mce.command_handler(0, 4, 0, 0), Err(Error::InvalidArgument));
        assert_eq!(mce.command_handler(1, 0, 0, 0), Err(Error::InvalidArgument));
        assert_eq!(mce.command_handler(u64::MAX, 0, 0, 0), Err(Error::InvalidArgument));
        assert_eq!(
            nvg.requests(),
            [
                Request::Plain(NvgChannel::IsSc7Allowed),
                Request::Plain(NvgChannel::IsSc7Allowed),
                Request::Data(NvgChannel::WakeTime, 1000),
                Request::Data(NvgChannel::OnlineCore, 3),
            ]
        );
    }

    #[test]
    fn strict_checking_on_silicon() {
        let nvg = FakeNvg::with_results(&[]);
        let core = FakeCore::default();
        let mce = mce(&nvg, &core);

        assert_eq!(mce.enable_strict_checking(), Ok(()));
        assert_eq!(core.tlb_invalidations(), 1);
        assert_eq!(nvg.cache_ops(), ["inval_all"]);
        assert_eq!(nvg.requests(), [Request::Data(NvgChannel::SecurityConfig, 3)]);
    }

    #[test]
    fn strict_checking_without_mmu_skips_tlb_invalidation() {
        let nvg = FakeNvg::with_results(&[]);
        let mut core = FakeCore::default();
        core.mmu = false;
        let mce = Mce::new(&nvg, &core, chip(TegraPlatform::Fpga));

        assert_eq!(mce.enable_strict_checking(), Ok(()));
        assert_eq!(core.tlb_invalidations(), 0);
        assert_eq!(nvg.requests(), [Request::Data(NvgChannel::SecurityConfig, 3)]);
    }

    #[test]
    fn strict_checking_fails_if_cache_flush_fails() {
        let core = FakeCore::default();
        let nvg = FakeNvg::default();
        assert_eq!(
            mce(&nvg, &core).enable_strict_checking(),
            Err(Error::InvalidArgument)
        );
        assert!(nvg.requests().is_empty());

        let mut core = FakeCore::default();
        core.cache_ops = false;
        let nvg = FakeNvg::with_results(&[]);
        assert_eq!(
            mce(&nvg, &core).enable_strict_checking(),
            Err(Error::InvalidArgument)
        );
        assert!(nvg.cache_ops().is_empty());
        assert!(nvg.requests().is_empty());
    }

    #[test]
    fn shutdown_and_reboot() {
        let nvg = FakeNvg::default();
        let core = FakeCore::default();
        let mce = mce(&nvg, &core);

        assert_eq!(mce.system_shutdown(), Ok(()));
        assert_eq!(mce.system_reboot(), Ok(()));
        assert_eq!(
            nvg.requests(),
            [
                Request::Data(NvgChannel::Shutdown, 0),
                Request::Data(NvgChannel::Shutdown, 1),
            ]
        );
    }
}
