// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Platform selection, and identification of the Tegra chip and the platform it runs on.

macro_rules! select_platform {
    (target, $mod:ident::$plat_impl:ident) => {
        #[cfg(not(test))]
        pub mod $mod;

        #[cfg(not(test))]
        pub use $mod::$plat_impl as PlatformImpl;
    };
    (test, $mod:ident::$plat_impl:ident) => {
        #[cfg(test)]
        mod $mod;

        #[cfg(test)]
        pub use $mod::$plat_impl as PlatformImpl;
    };
}

select_platform!(target, tegra194::Tegra194);
select_platform!(test, test::TestPlatform);

use crate::{
    gicv2::GicConfig,
    logger::LogSink,
    mmio::Mmio,
    services::arch::WorkaroundSupport,
};
use log::info;
#[cfg(all(not(test), target_arch = "aarch64"))]
pub use percore::exception_free;
#[cfg(not(any(test, target_arch = "aarch64")))]
use percore::ExceptionFree;
#[cfg(test)]
pub use test::exception_free;

/// Type alias for convenience, to avoid having to use the complicated type name everywhere.
pub type LogSinkImpl = <PlatformImpl as Platform>::LogSinkImpl;

/// The hooks implemented by all platforms.
///
/// # Safety
///
/// `core_position` must never return the same index for two different valid MPIDR values, and
/// must never return a value greater than or equal to `CORE_COUNT`.
pub unsafe trait Platform {
    /// The number of CPU cores.
    const CORE_COUNT: usize;

    /// The number of CPU clusters.
    const CLUSTER_COUNT: usize;

    /// The size in bytes of the largest cache line across all the cache levels in the platform.
    const CACHE_WRITEBACK_GRANULE: usize;

    /// The secure interrupts of the platform.
    const GIC_CONFIG: GicConfig;

    /// Platform dependent LogSink implementation type for Logger.
    type LogSinkImpl: LogSink + Send + Sync + 'static;

    /// Given a valid MPIDR value, returns the corresponding linear core index.
    ///
    /// For an invalid MPIDR value no guarantees are made about the return value.
    fn core_position(mpidr: u64) -> usize;

    /// Returns whether this platform supports the arch WORKAROUND_1 SMC.
    fn arch_workaround_1_supported() -> WorkaroundSupport;

    /// Returns whether this platform supports the arch WORKAROUND_2 SMC.
    fn arch_workaround_2_supported() -> WorkaroundSupport;
}

/// Fallback for host builds of the library outside unit tests, which have no exceptions to mask.
#[cfg(not(any(test, target_arch = "aarch64")))]
pub fn exception_free<T>(f: impl FnOnce(ExceptionFree) -> T) -> T {
    // SAFETY: Host builds don't take hardware exceptions.
    let token = unsafe { ExceptionFree::new() };
    f(token)
}

/// Offset of the chip id register in the MISC block.
pub const HIDREV_OFFSET: usize = 0x4;

const MAJOR_VERSION_SHIFT: u32 = 4;
const MAJOR_VERSION_MASK: u32 = 0xF;
const CHIP_ID_SHIFT: u32 = 8;
const CHIP_ID_MASK: u32 = 0xFF;
const MINOR_VERSION_SHIFT: u32 = 16;
const MINOR_VERSION_MASK: u32 = 0xF;
const PRE_SI_PLATFORM_SHIFT: u32 = 20;
const PRE_SI_PLATFORM_MASK: u32 = 0xF;

/// The kind of platform the firmware is running on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TegraPlatform {
    /// Real silicon.
    Silicon,
    /// QuickTurn emulation.
    Qt,
    /// Full-chip FPGA.
    Fpga,
    /// Linsim simulation.
    Linsim,
    /// Unit FPGA, which behaves like linsim as far as firmware is concerned.
    UnitFpga,
    /// Virtual development kit.
    VirtDevKit,
    /// A pre-silicon platform this firmware doesn't know about.
    Unknown,
}

/// Identification of the chip, from the MISC block's chip id register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChipInfo {
    /// Chip id, e.g. [`ChipInfo::TEGRA194`].
    pub chip_id: u32,
    /// Major revision. Zero on pre-silicon platforms.
    pub major: u32,
    /// Minor revision.
    pub minor: u32,
    /// Which platform the chip is running on.
    pub platform: TegraPlatform,
}

#[allow(missing_docs)]
impl ChipInfo {
    pub const TEGRA132: u32 = 0x13;
    pub const TEGRA186: u32 = 0x18;
    pub const TEGRA194: u32 = 0x19;
    pub const TEGRA210: u32 = 0x21;
}

impl ChipInfo {
    /// Decodes the value of the chip id register.
    pub fn from_hidrev(value: u32) -> Self {
        let major = (value >> MAJOR_VERSION_SHIFT) & MAJOR_VERSION_MASK;
        let minor = (value >> MINOR_VERSION_SHIFT) & MINOR_VERSION_MASK;
        let pre_si = (value >> PRE_SI_PLATFORM_SHIFT) & PRE_SI_PLATFORM_MASK;

        let platform = if major == 0 {
            // Older pre-silicon platforms encode the platform in the minor version.
            match minor {
                0 | 2 => TegraPlatform::Qt,
                1 => TegraPlatform::Fpga,
                3 | 4 => TegraPlatform::Linsim,
                5 => TegraPlatform::UnitFpga,
                6 => TegraPlatform::VirtDevKit,
                _ => TegraPlatform::Unknown,
            }
        } else {
            match pre_si {
                0 => TegraPlatform::Silicon,
                1 | 4 => TegraPlatform::Qt,
                2 => TegraPlatform::Fpga,
                3 => TegraPlatform::UnitFpga,
                5 | 6 => TegraPlatform::Linsim,
                8 => TegraPlatform::VirtDevKit,
                _ => TegraPlatform::Unknown,
            }
        };

        Self {
            chip_id: (value >> CHIP_ID_SHIFT) & CHIP_ID_MASK,
            major,
            minor,
            platform,
        }
    }

    /// Reads and decodes the chip id register of the given MISC block.
    pub fn read(misc: &impl Mmio) -> Self {
        let info = Self::from_hidrev(misc.read_32(HIDREV_OFFSET));
        info!(
            "Tegra chip {:#x} rev {}.{} on {:?}",
            info.chip_id, info.major, info.minor, info.platform
        );
        info
    }

    /// Returns whether this is real silicon.
    pub fn is_silicon(&self) -> bool {
        self.platform == TegraPlatform::Silicon
    }

    /// Returns whether this is a full-chip FPGA.
    pub fn is_fpga(&self) -> bool {
        self.platform == TegraPlatform::Fpga
    }

    /// Returns whether this is linsim or a unit FPGA.
    pub fn is_linsim(&self) -> bool {
        matches!(
            self.platform,
            TegraPlatform::Linsim | TegraPlatform::UnitFpga
        )
    }

    /// Returns whether this is QuickTurn emulation.
    pub fn is_qt(&self) -> bool {
        self.platform == TegraPlatform::Qt
    }

    /// Returns whether this is a virtual development kit.
    pub fn is_virt_dev_kit(&self) -> bool {
        self.platform == TegraPlatform::VirtDevKit
    }
}
