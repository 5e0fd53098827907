// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Tegra silicon provider SMCs: video memory carveout resizing, the normal world FIQ debugger
//! hooks, and SoC-specific calls.

use crate::{
    context::{CpuContext, PerCoreState},
    error::Error,
    mce::{Mce, carmel::CoreRegisters, nvg::NvgInterface},
    mmio::Mmio,
    platform::{Platform, PlatformImpl, exception_free},
    services::{Service, owns},
    smccc::{OwningEntityNumber, SMC_UNK, SUCCESS, SmcCall, SmcReturn},
};
use core::{
    cell::RefCell,
    sync::atomic::{AtomicU64, Ordering},
};
use log::{error, info, warn};
use percore::{ExceptionLock, PerCore};

const TEGRA_SIP_NEW_VIDEOMEM_REGION: u32 = 0x8200_0003;
const TEGRA_SIP_FIQ_NS_ENTRYPOINT: u32 = 0x8200_0005;
const TEGRA_SIP_FIQ_NS_GET_CONTEXT: u32 = 0x8200_0006;

// The MCE commands occupy the top 256 function numbers of the SiP range.
const MCE_CMD_NUMBER_BASE: u16 = 0xFF00;
const MCE_CMD_MASK: u16 = 0xFF;

// GPU reset registers in the clock and reset controller.
const GPU_RESET_REG_OFFSET: usize = 0x18;
const GPU_RESET_GPU_SET_OFFSET: usize = 0x1C;
const GPU_RESET_BIT: u32 = 1 << 0;
const GPU_SET_BIT: u32 = 1 << 0;

const VIDEOMEM_ALIGN_MASK: u64 = 0xF_FFFF;

/// SPSR for entering the normal world FIQ handler: AArch64 EL1 using SP_EL1, with D, A, I and F
/// masked.
const SPSR_EL1H_ALL_MASKED: u64 = 0x3C5;

/// The physical memory map, as far as checking addresses passed by the normal world goes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryLayout {
    /// The first byte of DRAM.
    pub dram_base: u64,
    /// The last byte of DRAM.
    pub dram_end: u64,
    /// Where BL31 was loaded.
    pub bl31_base: u64,
    /// The end of the TZDRAM carveout, which holds BL31 and BL32.
    pub tzdram_end: u64,
}

impl MemoryLayout {
    /// Checks that the given range lies in DRAM and doesn't overlap the secure carveout.
    ///
    /// A range which is both out of bounds and overlapping is reported as overlapping.
    pub fn check_ns_address(&self, base: u64, size: u64) -> Result<(), Error> {
        let end = base.wrapping_add(size).wrapping_sub(1);
        let mut result = Ok(());

        if base < self.dram_base || base >= self.dram_end || end > self.dram_end {
            error!("NS address {base:#x} is out-of-bounds!");
            result = Err(Error::BadAddress);
        }

        let disjoint = base < end && (base > self.tzdram_end || end < self.bl31_base);
        if !disjoint {
            error!("NS address {base:#x} overlaps TZDRAM!");
            result = Err(Error::NotSupported);
        }

        result
    }
}

/// Programs memory controller carveouts.
pub trait MemoryController: Sync {
    /// Moves the video memory carveout to the given range.
    fn setup_videomem(&self, base: u64, size: u64);
}

/// SoC-specific SiP calls, consulted before the common ones.
pub trait SocSipHandler: Sync {
    /// Returns the result of the call if it is one the SoC handles, or `None` to fall through to
    /// the common calls.
    fn handle(&self, call: &SmcCall) -> Option<SmcReturn>;
}

/// The normal world state at the time a FIQ was taken to EL3.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FiqContext {
    /// Where the normal world was interrupted.
    pub elr_el3: u64,
    /// The normal world's PSTATE when it was interrupted.
    pub spsr_el3: u64,
    /// The EL0 stack pointer.
    pub sp_el0: u64,
    /// The EL1 stack pointer.
    pub sp_el1: u64,
}

impl FiqContext {
    const EMPTY: Self = Self {
        elr_el3: 0,
        spsr_el3: 0,
        sp_el0: 0,
        sp_el1: 0,
    };
}

/// The Tegra SiP service.
pub struct TegraSip<'a, M: Mmio> {
    car: M,
    layout: MemoryLayout,
    memory_controller: &'a dyn MemoryController,
    soc: Option<&'a dyn SocSipHandler>,
    ns_fiq_entrypoint: AtomicU64,
    fiq_contexts: PerCoreState<FiqContext>,
}

impl<'a, M: Mmio> TegraSip<'a, M> {
    /// Creates the service, with `car` being the GPU reset registers of the clock and reset
    /// controller.
    pub const fn new(
        car: M,
        layout: MemoryLayout,
        memory_controller: &'a dyn MemoryController,
        soc: Option<&'a dyn SocSipHandler>,
    ) -> Self {
        Self {
            car,
            layout,
            memory_controller,
            soc,
            ns_fiq_entrypoint: AtomicU64::new(0),
            fiq_contexts: PerCore::new(
                [const { ExceptionLock::new(RefCell::new(FiqContext::EMPTY)) };
                    PlatformImpl::CORE_COUNT],
            ),
        }
    }

    fn gpu_in_reset(&self) -> bool {
        self.car.read_32(GPU_RESET_REG_OFFSET) & GPU_RESET_BIT != 0
    }

    /// Moves the video memory carveout, which the GPU must not be using.
    pub fn new_videomem_region(&self, base: u64, size: u32) -> Result<(), Error> {
        let size = u64::from(size);
        self.layout.check_ns_address(base, size)?;

        if base & VIDEOMEM_ALIGN_MASK != 0 || size & VIDEOMEM_ALIGN_MASK != 0 {
            error!("Unaligned Video Memory base address!");
            return Err(Error::NotSupported);
        }

        // The GPU must stay in reset while the carveout moves.
        if !self.gpu_in_reset() {
            error!("GPU not in reset! Video Memory setup failed");
            return Err(Error::NotSupported);
        }

        self.memory_controller.setup_videomem(base, size);

        if !self.gpu_in_reset() {
            self.car.write_32(GPU_RESET_GPU_SET_OFFSET, GPU_SET_BIT);
        }
        Ok(())
    }

    /// Records where the normal world wants FIQs delivered.
    fn set_ns_fiq_entrypoint(&self, entrypoint: u64) -> SmcReturn {
        if entrypoint == 0 {
            return SMC_UNK.into();
        }
        info!("NS FIQ handler at {entrypoint:#x}");
        self.ns_fiq_entrypoint.store(entrypoint, Ordering::Release);
        SUCCESS.into()
    }

    /// Returns the normal world state saved by the last FIQ taken on the calling core.
    pub fn fiq_context(&self) -> FiqContext {
        exception_free(|token| *self.fiq_contexts.get().borrow(token).borrow())
    }

    /// Redirects the normal world to its FIQ handler, saving the interrupted state for it to
    /// retrieve later.
    ///
    /// Returns false and leaves the context alone if no handler has been registered.
    pub fn handle_fiq(&self, ns_context: &mut CpuContext) -> bool {
        let entrypoint = self.ns_fiq_entrypoint.load(Ordering::Acquire);
        if entrypoint == 0 {
            warn!("FIQ with no NS handler registered");
            return false;
        }

        let saved = FiqContext {
            elr_el3: ns_context.el3_state.elr_el3,
            spsr_el3: ns_context.el3_state.spsr_el3,
            sp_el0: ns_context.sp_el0,
            sp_el1: ns_context.sp_el1,
        };
        exception_free(|token| {
            *self.fiq_contexts.get().borrow(token).borrow_mut() = saved;
        });

        ns_context.el3_state.elr_el3 = entrypoint;
        ns_context.el3_state.spsr_el3 = SPSR_EL1H_ALL_MASKED;
        true
    }
}

impl<M: Mmio + Sync> Service for TegraSip<'_, M> {
    owns!(OwningEntityNumber::SIP);

    fn handle(&self, call: &SmcCall) -> SmcReturn {
        if let Some(result) = self.soc.and_then(|soc| soc.handle(call)) {
            return result;
        }

        match call.function.0 {
            TEGRA_SIP_NEW_VIDEOMEM_REGION => {
                match self.new_videomem_region(call.arg(1), call.arg(2) as u32) {
                    Ok(()) => SUCCESS.into(),
                    Err(e) => e.into(),
                }
            }
            TEGRA_SIP_FIQ_NS_ENTRYPOINT => self.set_ns_fiq_entrypoint(call.arg(1)),
            TEGRA_SIP_FIQ_NS_GET_CONTEXT => {
                let context = self.fiq_context();
                [
                    context.elr_el3,
                    context.spsr_el3,
                    context.sp_el0,
                    context.sp_el1,
                ]
                .into()
            }
            _ => {
                error!("Unhandled SiP SMC {}", call.function);
                SMC_UNK.into()
            }
        }
    }
}

/// The Tegra194 SoC SiP calls: MCE commands from the normal world.
pub struct MceSipHandler<'a, N: NvgInterface, C: CoreRegisters> {
    mce: &'a Mce<N, C>,
}

impl<'a, N: NvgInterface, C: CoreRegisters> MceSipHandler<'a, N, C> {
    /// Creates a handler forwarding MCE commands to `mce`.
    pub const fn new(mce: &'a Mce<N, C>) -> Self {
        Self { mce }
    }
}

impl<N: NvgInterface + Sync, C: CoreRegisters + Sync> SocSipHandler for MceSipHandler<'_, N, C> {
    fn handle(&self, call: &SmcCall) -> Option<SmcReturn> {
        let number = call.function.number();
        if number & !MCE_CMD_MASK != MCE_CMD_NUMBER_BASE {
            return None;
        }
        let command = u64::from(number & MCE_CMD_MASK);

        Some(
            match self
                .mce
                .command_handler(command, call.arg(1), call.arg(2), call.arg(3))
            {
                Ok(value) => value.into(),
                Err(e) => e.into(),
            },
        )
    }
}
