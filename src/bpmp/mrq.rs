// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Message requests (MRQs) to the BPMP firmware for module resets and clock gating.

use super::{Bpmp, ChannelMemory};
use crate::{delay::Delay, error::Error, mmio::Mmio};
use log::error;
use zerocopy::{Immutable, IntoBytes};

const MRQ_RESET: i32 = 20;
const MRQ_CLK: i32 = 22;

const CMD_RESET_MODULE: u32 = 3;
const CMD_CLK_ENABLE: u32 = 7;
const CMD_CLK_DISABLE: u32 = 8;
const CLK_CMD_SHIFT: u32 = 24;

/// Tegra194 reset ids.
pub mod reset {
    /// GPC DMA engine.
    pub const GPCDMA: u32 = 70;
    /// XUSB pad controller.
    pub const XUSB_PADCTL: u32 = 114;
}

/// Tegra194 clock ids.
pub mod clock {
    /// Fuse controller.
    pub const FUSE: u32 = 40;
    /// Security engine.
    pub const SE: u32 = 124;
}

#[derive(Debug, Immutable, IntoBytes)]
#[repr(C)]
struct ResetRequest {
    cmd: u32,
    id: u32,
}

#[derive(Debug, Immutable, IntoBytes)]
#[repr(C)]
struct ClockRequest {
    cmd_and_id: u32,
}

impl ClockRequest {
    fn new(cmd: u32, id: u32) -> Self {
        Self {
            cmd_and_id: (cmd << CLK_CMD_SHIFT) | id,
        }
    }
}

impl<M: Mmio, C: ChannelMemory, D: Delay> Bpmp<M, C, D> {
    /// Sends a request which has no response payload, and treats a non-zero response code as a
    /// failure.
    fn request(&self, mrq: i32, request: &[u8]) -> Result<(), Error> {
        let mut response = [0u8; 0];
        match self.send_receive(mrq, request, &mut response)? {
            0 => Ok(()),
            code => Err(Error::Rejected(code)),
        }
    }

    /// Asks the BPMP to pulse the reset of module `id`.
    pub fn reset_module(&self, id: u32) -> Result<(), Error> {
        let request = ResetRequest {
            cmd: CMD_RESET_MODULE,
            id,
        };
        self.request(MRQ_RESET, request.as_bytes())
            .inspect_err(|e| error!("Failed to reset module {id}: {e}"))
    }

    /// Asks the BPMP to enable clock `id`.
    pub fn enable_clock(&self, id: u32) -> Result<(), Error> {
        self.request(MRQ_CLK, ClockRequest::new(CMD_CLK_ENABLE, id).as_bytes())
            .inspect_err(|e| error!("Failed to enable clock {id}: {e}"))
    }

    /// Asks the BPMP to disable clock `id`.
    pub fn disable_clock(&self, id: u32) -> Result<(), Error> {
        self.request(MRQ_CLK, ClockRequest::new(CMD_CLK_DISABLE, id).as_bytes())
            .inspect_err(|e| error!("Failed to disable clock {id}: {e}"))
    }
}
