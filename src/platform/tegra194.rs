// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The Tegra194 platform.

use super::{ChipInfo, Platform};
use crate::{
    bpmp::{Bpmp, BpmpRegisters, PhysicalChannelMemory},
    context::{CpuContext, GpRegs, World},
    delay::{SecurePhysicalTimer, TimerDelay},
    gicv2::{
        GicConfig, Gicv2CpuInterface, Gicv2Distributor, InterruptConfig, InterruptRouting,
    },
    logger::{self, LockedWriter},
    mce::{Mce, carmel::CarmelRegisters, nvg::NvgRegisters},
    mmio::MmioRegion,
    power::Tegra194Power,
    services::{
        DispatchError, DispatchTable,
        arch::{Arch, WorkaroundSupport},
        sip::{MceSipHandler, MemoryController, MemoryLayout, TegraSip},
        std_svc::{PowerStateCoordinator, StandardService},
    },
    smccc::{SMC_UNK, SmcReturn},
};
use arm_gic::{IntId, Trigger};
use arm_sysregs::MpidrEl1;
use core::fmt::Write;
use log::{SetLoggerError, error};
use spin::Once;

const MISC_BASE: usize = 0x0010_0000;
const FUSE_BASE: usize = 0x0382_0000;
const GICD_BASE: usize = 0x0388_1000;
const GICC_BASE: usize = 0x0388_2000;
const CAR_RESET_BASE: usize = 0x2000_0000;

// BPMP mailbox blocks.
const RES_SEMA_BASE: usize = 0x6000_1000;
const PRI_ICTLR_BASE: usize = 0x6000_4000;
const BPMP_CAR_BASE: usize = 0x6000_6000;
const ATOMICS_BASE: usize = 0x7001_6000;

/// Frequency of the system counter, in Hz.
const SYS_COUNTER_FREQ: u32 = 31_250_000;

const CORES_PER_CLUSTER: usize = 2;

const TOP_WDT_IRQ: u32 = 49;
const AON_WDT_IRQ: u32 = 50;

const fn watchdog(irq: u32) -> InterruptConfig {
    InterruptConfig {
        id: IntId::spi(irq - 32),
        target_mask: 0xFF,
        trigger: Trigger::Level,
        routing: InterruptRouting::El3,
    }
}

const SECURE_INTERRUPTS: [InterruptConfig; 2] = [watchdog(TOP_WDT_IRQ), watchdog(AON_WDT_IRQ)];

static DELAY: TimerDelay<SecurePhysicalTimer> =
    TimerDelay::new(SecurePhysicalTimer, SYS_COUNTER_FREQ);

type Tegra194Bpmp =
    Bpmp<MmioRegion, PhysicalChannelMemory, &'static TimerDelay<SecurePhysicalTimer>>;
type Tegra194Mce = Mce<NvgRegisters, CarmelRegisters>;

/// The power management hooks of the platform.
pub type Tegra194PowerImpl =
    Tegra194Power<'static, NvgRegisters, CarmelRegisters, Tegra194Bpmp, MmioRegion>;

static BPMP: Tegra194Bpmp = Bpmp::new(
    BpmpRegisters {
        // SAFETY: These are the register blocks of the BPMP mailbox protocol, which are
        // identity-mapped and only accessed through this driver.
        semaphore: unsafe { MmioRegion::new(RES_SEMA_BASE) },
        // SAFETY: As above.
        atomics: unsafe { MmioRegion::new(ATOMICS_BASE) },
        // SAFETY: As above.
        interrupt_controller: unsafe { MmioRegion::new(PRI_ICTLR_BASE) },
        // SAFETY: As above.
        car: unsafe { MmioRegion::new(BPMP_CAR_BASE) },
    },
    // SAFETY: The channel records are only accessed at the addresses handed out by the atomics
    // block.
    unsafe { PhysicalChannelMemory::new() },
    &DELAY,
);

static MCE: Once<Tegra194Mce> = Once::new();
static POWER: Once<Tegra194PowerImpl> = Once::new();
static MCE_SIP: Once<MceSipHandler<'static, NvgRegisters, CarmelRegisters>> = Once::new();
static SIP: Once<TegraSip<'static, MmioRegion>> = Once::new();
static STD_SVC: Once<StandardService<'static>> = Once::new();
static SERVICES: Once<DispatchTable<'static>> = Once::new();

/// NVIDIA Tegra194.
pub struct Tegra194;

// SAFETY: `core_position` returns a unique index below `CORE_COUNT` for each of the 4 clusters of 2
// cores.
unsafe impl Platform for Tegra194 {
    const CORE_COUNT: usize = 8;
    const CLUSTER_COUNT: usize = 4;
    const CACHE_WRITEBACK_GRANULE: usize = 1 << 6;

    const GIC_CONFIG: GicConfig = GicConfig {
        secure_interrupts: &SECURE_INTERRUPTS,
    };

    type LogSinkImpl = LockedWriter<&'static mut (dyn Write + Send)>;

    fn core_position(mpidr: u64) -> usize {
        let mpidr = MpidrEl1::from_bits_retain(mpidr);
        usize::from(mpidr.aff1()) * CORES_PER_CLUSTER + usize::from(mpidr.aff0())
    }

    fn arch_workaround_1_supported() -> WorkaroundSupport {
        WorkaroundSupport::Required
    }

    fn arch_workaround_2_supported() -> WorkaroundSupport {
        WorkaroundSupport::NotRequired
    }
}

impl Tegra194 {
    /// Sends log output to `console`.
    pub fn init_console(console: &'static mut (dyn Write + Send)) -> Result<(), SetLoggerError> {
        logger::init(LockedWriter::new(console))
    }

    /// Brings up the MCE, BPMP and GIC on the boot core and builds the SMC dispatch table.
    ///
    /// `coordinator` handles PSCI calls, `memory_controller` moves carveouts on behalf of the SiP
    /// service, and `layout` is the memory map reported by the boot loader.
    pub fn init(
        coordinator: &'static dyn PowerStateCoordinator,
        memory_controller: &'static dyn MemoryController,
        layout: MemoryLayout,
    ) -> Result<&'static DispatchTable<'static>, DispatchError> {
        DELAY.timer().enable();

        // SAFETY: The MISC block is identity-mapped and only read here.
        let misc = unsafe { MmioRegion::new(MISC_BASE) };
        let chip = ChipInfo::read(&misc);
        let mce = MCE.call_once(|| Mce::new(NvgRegisters, CarmelRegisters, chip));
        mce.verify_firmware_version();

        Self::init_gic();

        if let Err(e) = BPMP.init() {
            error!("BPMP unavailable: {e}");
        }

        POWER.call_once(|| {
            // SAFETY: The fuse block is identity-mapped, and only its read-only fuses are read.
            let fuse = unsafe { MmioRegion::new(FUSE_BASE) };
            Tegra194Power::new(mce, &BPMP, CarmelRegisters, fuse)
        });

        let mce_sip = MCE_SIP.call_once(|| MceSipHandler::new(mce));
        let sip = SIP.call_once(|| {
            // SAFETY: The GPU reset registers of the clock and reset controller are
            // identity-mapped and only accessed by the SiP service.
            let car = unsafe { MmioRegion::new(CAR_RESET_BASE) };
            TegraSip::new(car, layout, memory_controller, Some(mce_sip))
        });
        let std_svc = STD_SVC.call_once(|| StandardService::new(coordinator));

        let mut table = DispatchTable::new();
        table.register(&Arch)?;
        table.register(std_svc)?;
        table.register(sip)?;
        table.init();
        Ok(SERVICES.call_once(|| table))
    }

    fn init_gic() {
        // SAFETY: The GIC distributor is identity-mapped and only driven by EL3 during boot.
        let distributor = Gicv2Distributor::new(unsafe { MmioRegion::new(GICD_BASE) });
        distributor.configure_secure_interrupts(Self::GIC_CONFIG.secure_interrupts);

        if Self::GIC_CONFIG.routes_to_el3() {
            // SAFETY: The CPU interface is banked per core, and identity-mapped.
            let cpu_interface = Gicv2CpuInterface::new(unsafe { MmioRegion::new(GICC_BASE) });
            cpu_interface.enable_fiq();
        }
    }

    /// Returns the power management hooks, once [`Self::init`] has run.
    pub fn power() -> Option<&'static Tegra194PowerImpl> {
        POWER.get()
    }

    /// Handles an SMC from a lower EL, whose registers are in `regs`.
    pub fn handle_smc(regs: &mut GpRegs, world: World, cookie: u64) {
        match SERVICES.get() {
            Some(services) => services.dispatch(regs, world, cookie),
            None => {
                error!("SMC before the dispatch table was built");
                regs.write_return_value(&SmcReturn::from(SMC_UNK));
            }
        }
    }

    /// Handles a FIQ taken from the normal world, whose state is in `ns_context`.
    pub fn handle_fiq(ns_context: &mut CpuContext) -> bool {
        SIP.get().is_some_and(|sip| sip.handle_fiq(ns_context))
    }
}
