// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Register-level configuration of a GICv2 distributor and CPU interface.
//!
//! Only the parts needed to set up the platform's secure interrupts are here; everything else is
//! left to the normal world's driver.

use crate::mmio::Mmio;
use arm_gic::{IntId, Trigger};
use bitflags::bitflags;
use log::debug;

// Distributor registers.
const GICD_IGROUPR: usize = 0x80;
const GICD_ISENABLER: usize = 0x100;
const GICD_ICENABLER: usize = 0x180;
const GICD_ISPENDR: usize = 0x200;
const GICD_ICPENDR: usize = 0x280;
const GICD_ISACTIVER: usize = 0x300;
const GICD_ICACTIVER: usize = 0x380;
const GICD_IPRIORITYR: usize = 0x400;
const GICD_ITARGETSR: usize = 0x800;
const GICD_ICFGR: usize = 0xC00;

const IGROUPR_SHIFT: u32 = 5;
const ISENABLER_SHIFT: u32 = 5;
const ICENABLER_SHIFT: u32 = 5;
const ISPENDR_SHIFT: u32 = 5;
const ICPENDR_SHIFT: u32 = 5;
const ISACTIVER_SHIFT: u32 = 5;
const ICACTIVER_SHIFT: u32 = 5;
const ICFGR_SHIFT: u32 = 4;

// CPU interface registers.
const GICC_CTLR: usize = 0x0;

/// The highest priority a secure interrupt can have.
pub const GIC_HIGHEST_SEC_PRIORITY: u8 = 0x00;
/// The lowest priority a secure interrupt can have.
pub const GIC_LOWEST_SEC_PRIORITY: u8 = 0x7F;
/// The highest priority a non-secure interrupt can have.
pub const GIC_HIGHEST_NS_PRIORITY: u8 = 0x80;
/// The lowest priority a non-secure interrupt can have.
pub const GIC_LOWEST_NS_PRIORITY: u8 = 0xFE;

bitflags! {
    /// GICC_CTLR bits.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct GiccCtlr: u32 {
        /// Group 0 interrupts are signalled.
        const ENABLE_GRP0 = 1 << 0;
        /// Group 1 interrupts are signalled.
        const ENABLE_GRP1 = 1 << 1;
        /// Secure reads of IAR may acknowledge group 1 interrupts.
        const ACK_CTL = 1 << 2;
        /// Group 0 interrupts are signalled as FIQs.
        const FIQ_EN = 1 << 3;
        /// The secure binary point register applies to both groups.
        const CBPR = 1 << 4;
    }
}

/// Where a secure interrupt is handled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InterruptRouting {
    /// The secure payload at S-EL1.
    SecureEl1,
    /// The monitor at EL3.
    El3,
}

/// Which kind of interrupt a handler deals with.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InterruptType {
    /// Handled by the secure payload.
    SecureEl1,
    /// Handled by the normal world.
    NonSecure,
    /// Handled by EL3.
    El3,
}

/// The exception line an interrupt is signalled on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InterruptLine {
    /// IRQ.
    Irq,
    /// FIQ.
    Fiq,
}

/// The configuration of a single secure interrupt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InterruptConfig {
    /// Interrupt id.
    pub id: IntId,
    /// The CPU interfaces the interrupt is forwarded to, one bit per core.
    pub target_mask: u8,
    /// Whether the interrupt is edge or level triggered.
    pub trigger: Trigger,
    /// Where the interrupt is handled.
    pub routing: InterruptRouting,
}

/// The configuration of platform's GIC.
#[derive(Copy, Clone, Debug)]
pub struct GicConfig {
    /// Interrupts which must be configured as secure.
    pub secure_interrupts: &'static [InterruptConfig],
}

impl GicConfig {
    /// Returns whether any of the secure interrupts is handled at EL3.
    pub fn routes_to_el3(&self) -> bool {
        self.secure_interrupts
            .iter()
            .any(|config| config.routing == InterruptRouting::El3)
    }
}

/// Returns the offset of the register holding bit `id` of a 32-interrupts-per-register bank, and
/// the bit within it.
const fn bit_position(register: usize, shift: u32, id: u32) -> (usize, u32) {
    (
        register + ((id >> shift) << 2) as usize,
        id & ((1 << shift) - 1),
    )
}

/// Generates accessors for a single-bit-per-interrupt register bank whose bits are updated with a
/// read-modify-write.
macro_rules! rmw_bit_accessors {
    ($name:ident, $register:ident, $shift:ident) => {
        paste::paste! {
            #[doc = "Returns the " $register " bit of interrupt `id`."]
            pub fn [< get_ $name >](&self, id: u32) -> bool {
                let (offset, bit) = bit_position($register, $shift, id);
                self.regs.read_32(offset) & (1 << bit) != 0
            }

            #[doc = "Sets the " $register " bit of interrupt `id`."]
            pub fn [< set_ $name >](&self, id: u32) {
                let (offset, bit) = bit_position($register, $shift, id);
                self.regs.set_bits_32(offset, 1 << bit);
            }

            #[doc = "Clears the " $register " bit of interrupt `id`."]
            pub fn [< clr_ $name >](&self, id: u32) {
                let (offset, bit) = bit_position($register, $shift, id);
                self.regs.clear_bits_32(offset, 1 << bit);
            }
        }
    };
}

/// Generates accessors for a write-one-to-act register bank, where writing zero bits has no
/// effect.
macro_rules! write_one_accessors {
    ($name:ident, $register:ident, $shift:ident) => {
        paste::paste! {
            #[doc = "Returns the " $register " bit of interrupt `id`."]
            pub fn [< get_ $name >](&self, id: u32) -> bool {
                let (offset, bit) = bit_position($register, $shift, id);
                self.regs.read_32(offset) & (1 << bit) != 0
            }

            #[doc = "Writes one to the " $register " bit of interrupt `id`."]
            pub fn [< set_ $name >](&self, id: u32) {
                let (offset, bit) = bit_position($register, $shift, id);
                self.regs.write_32(offset, 1 << bit);
            }
        }
    };
}

/// A GICv2 distributor.
#[derive(Debug)]
pub struct Gicv2Distributor<M: Mmio> {
    regs: M,
}

impl<M: Mmio> Gicv2Distributor<M> {
    /// Creates a driver for the distributor registers `regs`.
    pub const fn new(regs: M) -> Self {
        Self { regs }
    }

    rmw_bit_accessors!(igroupr, GICD_IGROUPR, IGROUPR_SHIFT);
    write_one_accessors!(isenabler, GICD_ISENABLER, ISENABLER_SHIFT);
    write_one_accessors!(icenabler, GICD_ICENABLER, ICENABLER_SHIFT);
    write_one_accessors!(ispendr, GICD_ISPENDR, ISPENDR_SHIFT);
    write_one_accessors!(icpendr, GICD_ICPENDR, ICPENDR_SHIFT);
    write_one_accessors!(isactiver, GICD_ISACTIVER, ISACTIVER_SHIFT);
    write_one_accessors!(icactiver, GICD_ICACTIVER, ICACTIVER_SHIFT);

    /// Sets the priority of interrupt `id`.
    ///
    /// Panics if the priority isn't valid for the group the interrupt is currently in: non-secure
    /// interrupts must have priorities from 0x80 to 0xFE, and secure interrupts from 0x00 to 0x7F.
    pub fn set_ipriorityr(&self, id: u32, priority: u8) {
        if self.get_igroupr(id) {
            assert!(
                (GIC_HIGHEST_NS_PRIORITY..=GIC_LOWEST_NS_PRIORITY).contains(&priority),
                "Invalid priority {priority:#x} for non-secure interrupt {id}"
            );
        } else {
            assert!(
                priority <= GIC_LOWEST_SEC_PRIORITY,
                "Invalid priority {priority:#x} for secure interrupt {id}"
            );
        }
        self.regs.write_8(GICD_IPRIORITYR + id as usize, priority);
    }

    /// Sets which CPU interfaces interrupt `id` is forwarded to.
    pub fn set_itargetsr(&self, id: u32, target_mask: u8) {
        self.regs.write_8(GICD_ITARGETSR + id as usize, target_mask);
    }

    /// Sets whether interrupt `id` is edge or level triggered.
    pub fn set_icfgr(&self, id: u32, trigger: Trigger) {
        let (offset, field) = bit_position(GICD_ICFGR, ICFGR_SHIFT, id);
        let edge_bit = 1 << (field * 2 + 1);
        match trigger {
            Trigger::Edge => self.regs.set_bits_32(offset, edge_bit),
            Trigger::Level => self.regs.clear_bits_32(offset, edge_bit),
        }
    }

    /// Makes each of the given interrupts secure, with the highest secure priority, and enables
    /// it.
    pub fn configure_secure_interrupts(&self, configs: &[InterruptConfig]) {
        for config in configs {
            let id = u32::from(config.id);
            debug!(
                "Secure interrupt {id} to cores {:#04x}, handled at {:?}",
                config.target_mask, config.routing
            );
            self.clr_igroupr(id);
            self.set_ipriorityr(id, GIC_HIGHEST_SEC_PRIORITY);
            self.set_icfgr(id, config.trigger);
            self.set_itargetsr(id, config.target_mask);
            self.set_isenabler(id);
        }
    }
}

/// The GICv2 CPU interface of the calling core.
#[derive(Debug)]
pub struct Gicv2CpuInterface<M: Mmio> {
    regs: M,
}

impl<M: Mmio> Gicv2CpuInterface<M> {
    /// Creates a driver for the CPU interface registers `regs`.
    pub const fn new(regs: M) -> Self {
        Self { regs }
    }

    /// Returns the current GICC_CTLR value.
    pub fn control(&self) -> GiccCtlr {
        GiccCtlr::from_bits_retain(self.regs.read_32(GICC_CTLR))
    }

    /// Signals group 0 interrupts as FIQs.
    pub fn enable_fiq(&self) {
        self.regs
            .set_bits_32(GICC_CTLR, (GiccCtlr::FIQ_EN | GiccCtlr::ENABLE_GRP0).bits());
    }

    /// Returns the exception line interrupts of the given type are signalled on.
    pub fn interrupt_type_to_line(&self, interrupt_type: InterruptType) -> InterruptLine {
        match interrupt_type {
            InterruptType::NonSecure => InterruptLine::Irq,
            InterruptType::SecureEl1 | InterruptType::El3 => {
                if self.control().contains(GiccCtlr::FIQ_EN) {
                    InterruptLine::Fiq
                } else {
                    InterruptLine::Irq
                }
            }
        }
    }
}
