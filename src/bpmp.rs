// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Mailbox transport to the BPMP co-processor.
//!
//! Each CPU core owns one channel: a [`MailboxData`] record in memory shared with the BPMP, whose
//! address is handed out by the atomics block, and a two-bit field in the resource semaphore which
//! tracks who owns the record. The BPMP writes [`SIGN_OF_LIFE`] to the semaphore status register
//! once it has set up the channels, which also leaves every channel free.

pub mod mrq;

use crate::{
    aarch64::{dsb_sy, flush_dcache},
    context::CoresImpl,
    delay::{Delay, poll_until},
    error::Error,
    mmio::Mmio,
};
use bitflags::bitflags;
use core::sync::atomic::{AtomicU32, Ordering};
use log::{debug, error, info};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use percore::Cores;
use spin::Once;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// How many times to poll the semaphore before giving up. Polls are 1 ms apart.
pub const BPMP_TIMEOUT: u32 = 500;
const POLL_INTERVAL_MS: u32 = 1;

/// The number of mailbox channels, one per CPU core.
pub const CHANNEL_COUNT: usize = 12;

/// The maximum size in bytes of a request or response payload.
pub const MSG_DATA_SIZE: usize = 120;

/// Value of the semaphore status register once the BPMP firmware is up.
pub const SIGN_OF_LIFE: u32 = 0xAAAA_AAAA;

// Resource semaphore registers.
const STA_OFFSET: usize = 0x0;
const CLR_OFFSET: usize = 0x8;

// Atomics block.
const ATOMIC_CMD_GET: u32 = 4;
const TRIGGER_ID_SHIFT: u32 = 16;
const RESULT0_REG_OFFSET: usize = 0xC00;

// Legacy interrupt controller.
const CPU_IEP_FIR_SET: usize = 0x18;
const INT_SHR_SEM_OUTBOX_FULL: u32 = 6;

// Clock and reset controller.
const CLK_ENB_V: usize = 0x440;
const RST_DEV_CLR_V: usize = 0x434;
const CAR_ENABLE_ATOMICS: u32 = 1 << 16;

/// The semaphore bits of channel `ch`.
const fn ch_mask(ch: usize) -> u32 {
    0x3 << (ch * 2)
}

/// The semaphore value of channel `ch` when the record is free for the CPU to fill.
const fn ma_free(ch: usize) -> u32 {
    0x2 << (ch * 2)
}

/// The semaphore value of channel `ch` when the BPMP has acknowledged a request.
const fn ma_acked(ch: usize) -> u32 {
    0x3 << (ch * 2)
}

/// Returns the atomics command which asks for the base address of channel `ch`.
const fn channel_query(ch: usize) -> u32 {
    ((ch as u32) << TRIGGER_ID_SHIFT) | ATOMIC_CMD_GET
}

bitflags! {
    /// Flags of a mailbox request.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct MailboxFlags: u32 {
        /// The BPMP should acknowledge the request through the semaphore.
        const DO_ACK = 1 << 0;
        /// The BPMP should ring the doorbell when done.
        const RING_DOORBELL = 1 << 1;
    }
}

/// The record shared with the BPMP for each channel.
#[derive(Clone, Debug, Eq, FromBytes, Immutable, IntoBytes, KnownLayout, PartialEq)]
#[repr(C)]
pub struct MailboxData {
    /// The request code on the way in, the response code on the way out.
    pub code: i32,
    /// [`MailboxFlags`] bits.
    pub flags: u32,
    /// The request or response payload.
    pub data: [u8; MSG_DATA_SIZE],
}

const _: () = assert!(size_of::<MailboxData>() == 128);

/// Lifecycle of the connection to the BPMP.
#[derive(Copy, Clone, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum BpmpState {
    /// The handshake hasn't happened yet.
    Pending = 0,
    /// The BPMP is up and the channels are known.
    Complete = 1,
    /// The system is on its way into suspend; the BPMP must not be used.
    SuspendEntry = 2,
    /// The BPMP never showed a sign of life.
    NotPresent = 3,
}

impl BpmpState {
    fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Complete)
                | (Self::Pending, Self::NotPresent)
                | (Self::Complete, Self::SuspendEntry)
                | (Self::SuspendEntry, Self::Complete)
        )
    }
}

/// The register blocks which the mailbox protocol goes through.
#[derive(Debug)]
pub struct BpmpRegisters<M: Mmio> {
    /// The resource semaphore guarding the channels.
    pub semaphore: M,
    /// The atomics block which hands out channel base addresses.
    pub atomics: M,
    /// The interrupt controller used to tell the BPMP a request is ready.
    pub interrupt_controller: M,
    /// The clock and reset controller, used to check the atomics block is usable.
    pub car: M,
}

/// Access to the channel records, given their base addresses as reported by the atomics block.
pub trait ChannelMemory {
    /// Fills in the record at `base` with a request.
    fn write_request(&self, base: u32, code: i32, flags: MailboxFlags, payload: &[u8]);

    /// Copies `response.len()` bytes of payload out of the record at `base` and returns its code.
    fn read_response(&self, base: u32, response: &mut [u8]) -> i32;
}

impl<T: ChannelMemory + ?Sized> ChannelMemory for &T {
    fn write_request(&self, base: u32, code: i32, flags: MailboxFlags, payload: &[u8]) {
        (**self).write_request(base, code, flags, payload)
    }

    fn read_response(&self, base: u32, response: &mut [u8]) -> i32 {
        (**self).read_response(base, response)
    }
}

/// Channel records accessed in place at their physical addresses.
#[derive(Debug)]
pub struct PhysicalChannelMemory {
    _private: (),
}

impl PhysicalChannelMemory {
    /// Creates an accessor for the channel records.
    ///
    /// # Safety
    ///
    /// Every base address later passed to the accessors must be one reported by the atomics block,
    /// pointing to a mapped [`MailboxData`] which nothing else accesses except the BPMP.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl ChannelMemory for PhysicalChannelMemory {
    fn write_request(&self, base: u32, code: i32, flags: MailboxFlags, payload: &[u8]) {
        let record = base as usize as *mut MailboxData;
        let data = record.cast::<u8>().wrapping_add(core::mem::offset_of!(MailboxData, data));
        // SAFETY: The caller of `PhysicalChannelMemory::new` promised that `base` points to a
        // valid mailbox record, and `payload` has already been checked to fit in its data array.
        unsafe {
            (&raw mut (*record).code).write_volatile(code);
            (&raw mut (*record).flags).write_volatile(flags.bits());
            for (i, byte) in payload.iter().enumerate() {
                data.add(i).write_volatile(*byte);
            }
        }
    }

    fn read_response(&self, base: u32, response: &mut [u8]) -> i32 {
        let record = base as usize as *const MailboxData;
        let data = record.cast::<u8>().wrapping_add(core::mem::offset_of!(MailboxData, data));
        // SAFETY: The caller of `PhysicalChannelMemory::new` promised that `base` points to a
        // valid mailbox record, and `response` has already been checked to fit in its data array.
        unsafe {
            for (i, byte) in response.iter_mut().enumerate() {
                *byte = data.add(i).read_volatile();
            }
            (&raw const (*record).code).read_volatile()
        }
    }
}

/// The connection to the BPMP: its lifecycle state and the channel table.
///
/// The state is shared between all cores, some of which may be running with caches off, so every
/// change is cleaned to memory before anything relies on it.
pub struct Bpmp<M: Mmio, C: ChannelMemory, D: Delay> {
    registers: BpmpRegisters<M>,
    memory: C,
    delay: D,
    state: AtomicU32,
    channels: [Once<u32>; CHANNEL_COUNT],
}

impl<M: Mmio, C: ChannelMemory, D: Delay> Bpmp<M, C, D> {
    /// Creates a connection in the `Pending` state. Nothing is accessed until [`Self::init`].
    pub const fn new(registers: BpmpRegisters<M>, memory: C, delay: D) -> Self {
        Self {
            registers,
            memory,
            delay,
            state: AtomicU32::new(BpmpState::Pending as u32),
            channels: [const { Once::new() }; CHANNEL_COUNT],
        }
    }

    /// Returns the current state of the connection.
    pub fn state(&self) -> BpmpState {
        // Only `transition` stores to `state`, and it only stores valid values.
        BpmpState::try_from(self.state.load(Ordering::Acquire)).unwrap_or(BpmpState::NotPresent)
    }

    /// Moves to `next` and makes the new state visible to every core.
    ///
    /// Panics if the move isn't one of the allowed transitions.
    fn transition(&self, next: BpmpState) {
        let current = self.state();
        assert!(
            current.can_become(next),
            "Illegal BPMP state transition {current:?} -> {next:?}"
        );
        self.state.store(next.into(), Ordering::Release);
        flush_dcache(&self.state);
    }

    fn semaphore_field(&self, ch: usize) -> u32 {
        self.registers.semaphore.read_32(STA_OFFSET) & ch_mask(ch)
    }

    fn master_free(&self, ch: usize) -> bool {
        self.semaphore_field(ch) == ma_free(ch)
    }

    fn master_acked(&self, ch: usize) -> bool {
        self.semaphore_field(ch) == ma_acked(ch)
    }

    fn signal_slave(&self, ch: usize) {
        self.registers
            .semaphore
            .write_32(CLR_OFFSET, ch_mask(ch));
    }

    fn free_master(&self, ch: usize) {
        self.registers
            .semaphore
            .write_32(CLR_OFFSET, ma_acked(ch) ^ ma_free(ch));
    }

    fn wait_for_sign_of_life(&self) -> Result<u32, Error> {
        poll_until(&self.delay, POLL_INTERVAL_MS, BPMP_TIMEOUT, || {
            self.registers.semaphore.read_32(STA_OFFSET) == SIGN_OF_LIFE
        })
        .map_err(|_| Error::TimedOut)
    }

    /// Returns the base address of the record of channel `ch`.
    ///
    /// The first call for a channel asks the atomics block; later calls return the same address
    /// without touching the hardware.
    pub fn channel_base(&self, ch: usize) -> Result<u32, Error> {
        let cell = self.channels.get(ch).ok_or(Error::InvalidArgument)?;
        Ok(*cell.call_once(|| {
            let result = RESULT0_REG_OFFSET + ch * 4;
            self.registers.atomics.write_32(result, channel_query(ch));
            self.registers.atomics.read_32(result)
        }))
    }

    /// Waits for the BPMP to come up and discovers every channel.
    ///
    /// Only the first call does anything; later calls report the outcome of the first.
    pub fn init(&self) -> Result<(), Error> {
        match self.state() {
            BpmpState::Pending => {}
            BpmpState::NotPresent => return Err(Error::TimedOut),
            BpmpState::Complete | BpmpState::SuspendEntry => return Ok(()),
        }

        if self.wait_for_sign_of_life().is_err() {
            error!("BPMP not powered on");
            self.transition(BpmpState::NotPresent);
            return Err(Error::TimedOut);
        }

        if self.registers.car.read_32(CLK_ENB_V) & CAR_ENABLE_ATOMICS == 0 {
            error!("Clock to the atomics block is disabled");
        }
        if self.registers.car.read_32(RST_DEV_CLR_V) & CAR_ENABLE_ATOMICS != 0 {
            error!("Reset to the atomics block is asserted");
        }

        // The BPMP sets up the channel area before signalling the handshake.
        for ch in 0..CHANNEL_COUNT {
            let base = self.channel_base(ch)?;
            debug!("BPMP channel {ch} at {base:#010x}");
        }
        flush_dcache(&self.channels);

        self.transition(BpmpState::Complete);
        info!("BPMP init done");
        Ok(())
    }

    /// Sends `mrq` with `request` as payload on the calling core's channel and waits for the
    /// answer.
    ///
    /// On success fills `response` from the reply payload and returns the BPMP's response code.
    /// If the BPMP doesn't acknowledge in time the channel is left as it is; the next request on
    /// this core will then most likely time out waiting for the channel to be free.
    pub fn send_receive(&self, mrq: i32, request: &[u8], response: &mut [u8]) -> Result<i32, Error> {
        self.send_receive_on(CoresImpl::core_index(), mrq, request, response)
    }

    fn send_receive_on(
        &self,
        ch: usize,
        mrq: i32,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<i32, Error> {
        if request.len() > MSG_DATA_SIZE || response.len() > MSG_DATA_SIZE {
            return Err(Error::InvalidArgument);
        }
        if self.state() != BpmpState::Complete {
            return Err(Error::NotReady);
        }
        let base = self
            .channels
            .get(ch)
            .and_then(Once::get)
            .copied()
            .ok_or(Error::InvalidArgument)?;

        if poll_until(&self.delay, POLL_INTERVAL_MS, BPMP_TIMEOUT, || self.master_free(ch)).is_err() {
            error!("Timed out waiting for BPMP channel {ch} to be free");
            return Err(Error::TimedOut);
        }

        self.memory
            .write_request(base, mrq, MailboxFlags::DO_ACK, request);
        // The record must be in memory before the BPMP is told to look at it.
        dsb_sy();
        self.signal_slave(ch);
        self.registers
            .interrupt_controller
            .write_32(CPU_IEP_FIR_SET, 1 << INT_SHR_SEM_OUTBOX_FULL);

        if poll_until(&self.delay, POLL_INTERVAL_MS, BPMP_TIMEOUT, || self.master_acked(ch)).is_err() {
            error!("Timed out waiting for BPMP's response to MRQ {mrq} on channel {ch}");
            return Err(Error::TimedOut);
        }

        let code = self.memory.read_response(base, response);
        self.free_master(ch);
        Ok(code)
    }

    /// Freezes the interface ahead of system suspend.
    pub fn suspend(&self) {
        if self.state() == BpmpState::Complete {
            self.transition(BpmpState::SuspendEntry);
        } else {
            debug!("BPMP suspend skipped in state {:?}", self.state());
        }
    }

    /// Waits for the BPMP to come back after system resume and unfreezes the interface.
    ///
    /// If the BPMP doesn't show a sign of life the interface stays frozen and the error is
    /// returned for the caller to deal with.
    pub fn resume(&self) -> Result<(), Error> {
        if self.state() != BpmpState::SuspendEntry {
            return Ok(());
        }

        match self.wait_for_sign_of_life() {
            Ok(waited_ms) => {
                info!("BPMP took {waited_ms} ms to resume");
                self.transition(BpmpState::Complete);
                Ok(())
            }
            Err(e) => {
                error!("BPMP not powered on after resume");
                Err(e)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{CHANNEL_AREA, FakePeer, connect};
    use super::*;
    use crate::platform::{Platform, PlatformImpl};
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn semaphore_encoding() {
        assert_eq!(ch_mask(0), 0b11);
        assert_eq!(ma_free(0), 0b10);
        assert_eq!(ma_acked(5), 0b11 << 10);
        assert_eq!(ma_acked(3) ^ ma_free(3), 0b01 << 6);
        assert_eq!(channel_query(7), 0x0007_0004);
        // The sign of life leaves every channel free.
        assert!((0..CHANNEL_COUNT).all(|ch| SIGN_OF_LIFE & ch_mask(ch) == ma_free(ch)));
    }

    #[test]
    fn init_discovers_channels() {
        let peer = FakePeer::alive();
        let bpmp = connect(&peer);
        assert_eq!(bpmp.state(), BpmpState::Pending);

        assert_eq!(bpmp.init(), Ok(()));
        assert_eq!(bpmp.state(), BpmpState::Complete);
        assert_eq!(peer.channel_queries.get(), CHANNEL_COUNT);
        assert_eq!(bpmp.channel_base(1), Ok(CHANNEL_AREA + 128));

        // A second init changes nothing.
        assert_eq!(bpmp.init(), Ok(()));
        assert_eq!(peer.channel_queries.get(), CHANNEL_COUNT);
    }

    #[test]
    fn channel_discovery_is_idempotent() {
        let peer = FakePeer::alive();
        let bpmp = connect(&peer);

        for core in 0..PlatformImpl::CORE_COUNT {
            let first = bpmp.channel_base(core).unwrap();
            let queries = peer.channel_queries.get();
            assert_eq!(bpmp.channel_base(core), Ok(first));
            assert_eq!(bpmp.channel_base(core), Ok(first));
            assert_eq!(peer.channel_queries.get(), queries);
        }
        assert_eq!(peer.channel_queries.get(), PlatformImpl::CORE_COUNT);
        assert_eq!(bpmp.channel_base(CHANNEL_COUNT), Err(Error::InvalidArgument));
    }

    #[test]
    fn init_without_sign_of_life() {
        let peer = FakePeer::dead();
        let bpmp = connect(&peer);

        assert_eq!(bpmp.init(), Err(Error::TimedOut));
        assert_eq!(bpmp.state(), BpmpState::NotPresent);
        assert_eq!(bpmp.delay.elapsed_ms(), BPMP_TIMEOUT);
        assert_eq!(peer.channel_queries.get(), 0);

        // The BPMP showing up later doesn't matter any more.
        peer.status.set(SIGN_OF_LIFE);
        assert_eq!(bpmp.init(), Err(Error::TimedOut));
        let mut response = [0; 4];
        assert_eq!(
            bpmp.send_receive_on(0, 1, &[], &mut response),
            Err(Error::NotReady)
        );
    }

    #[test]
    fn send_before_init() {
        let peer = FakePeer::alive();
        let bpmp = connect(&peer);
        let mut response = [0; 4];

        assert_eq!(
            bpmp.send_receive_on(0, 1, &[1, 2], &mut response),
            Err(Error::NotReady)
        );
        assert!(peer.records.borrow().is_empty());
        // The semaphore was neither polled nor signalled.
        assert_eq!(peer.status.get(), SIGN_OF_LIFE);
        assert_eq!(peer.interrupts_raised.get(), 0);
        assert_eq!(bpmp.delay.elapsed_ms(), 0);
    }

    #[test]
    fn send_times_out_if_channel_never_free() {
        let peer = FakePeer::alive();
        let bpmp = connect(&peer);
        bpmp.init().unwrap();
        peer.status.set(0);

        let mut response = [0x5a; 16];
        assert_eq!(
            bpmp.send_receive_on(2, 22, &[1, 2, 3], &mut response),
            Err(Error::TimedOut)
        );
        assert_eq!(response, [0x5a; 16]);
        assert_eq!(bpmp.delay.elapsed_ms(), BPMP_TIMEOUT);
        assert!(peer.records.borrow().is_empty());
        assert_eq!(peer.interrupts_raised.get(), 0);
    }

    #[test]
    fn send_receive_round_trip() {
        let peer = FakePeer::alive();
        let bpmp = connect(&peer);
        bpmp.init().unwrap();
        peer.staged_code.set(7);
        *peer.staged_payload.borrow_mut() = vec![0xde, 0xad, 0xbe, 0xef, 0x01];

        let mut response = [0; 5];
        assert_eq!(
            bpmp.send_receive_on(3, 20, &[9, 8, 7, 6], &mut response),
            Ok(7)
        );
        assert_eq!(response, [0xde, 0xad, 0xbe, 0xef, 0x01]);
        assert_eq!(peer.channel_field(3), ma_free(3));
        assert_eq!(peer.interrupts_raised.get(), 1);

        let requests = peer.requests_seen.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].code, 20);
        assert_eq!(requests[0].flags, MailboxFlags::DO_ACK.bits());
        assert_eq!(requests[0].data[..4], [9, 8, 7, 6]);

        // Other channels are untouched.
        assert!(
            (0..CHANNEL_COUNT)
                .filter(|ch| *ch != 3)
                .all(|ch| peer.channel_field(ch) == ma_free(ch))
        );
    }

    #[test]
    fn send_receive_uses_calling_core() {
        let peer = FakePeer::alive();
        let bpmp = connect(&peer);
        bpmp.init().unwrap();
        peer.staged_code.set(-3);

        let mut response = [0u8; 0];
        assert_eq!(bpmp.send_receive(1, &[], &mut response), Ok(-3));
        assert_eq!(peer.requests_seen.borrow().len(), 1);
    }

    #[test]
    fn response_timeout_leaves_channel_acked_state_unresolved() {
        let peer = FakePeer::alive();
        let bpmp = connect(&peer);
        bpmp.init().unwrap();
        peer.responsive.set(false);

        let mut response = [0x11; 8];
        assert_eq!(
            bpmp.send_receive_on(0, 20, &[1], &mut response),
            Err(Error::TimedOut)
        );
        assert_eq!(response, [0x11; 8]);
        assert_eq!(peer.channel_field(0), 0);

        // So the next request can't get hold of the channel.
        peer.responsive.set(true);
        assert_eq!(
            bpmp.send_receive_on(0, 20, &[1], &mut response),
            Err(Error::TimedOut)
        );
    }

    #[test]
    fn oversized_payload_rejected() {
        let peer = FakePeer::alive();
        let bpmp = connect(&peer);
        bpmp.init().unwrap();

        let mut response = [0; 4];
        assert_eq!(
            bpmp.send_receive_on(0, 20, &[0; MSG_DATA_SIZE + 1], &mut response),
            Err(Error::InvalidArgument)
        );
        let mut response = [0; MSG_DATA_SIZE + 1];
        assert_eq!(
            bpmp.send_receive_on(0, 20, &[], &mut response),
            Err(Error::InvalidArgument)
        );
        assert!(peer.records.borrow().is_empty());
    }

    #[test]
    fn suspend_and_resume() {
        let peer = FakePeer::alive();
        let bpmp = connect(&peer);
        bpmp.init().unwrap();

        bpmp.suspend();
        assert_eq!(bpmp.state(), BpmpState::SuspendEntry);
        let mut response = [0; 4];
        assert_eq!(
            bpmp.send_receive_on(0, 20, &[], &mut response),
            Err(Error::NotReady)
        );

        assert_eq!(bpmp.resume(), Ok(()));
        assert_eq!(bpmp.state(), BpmpState::Complete);
        assert_eq!(bpmp.send_receive_on(0, 20, &[], &mut response), Ok(0));
    }

    #[test]
    fn resume_without_sign_of_life() {
        let peer = FakePeer::alive();
        let bpmp = connect(&peer);
        bpmp.init().unwrap();
        bpmp.suspend();
        peer.status.set(0);

        assert_eq!(bpmp.resume(), Err(Error::TimedOut));
        assert_eq!(bpmp.state(), BpmpState::SuspendEntry);
        assert_eq!(bpmp.delay.elapsed_ms(), BPMP_TIMEOUT);
    }

    #[test]
    fn suspend_and_resume_ignored_when_not_present() {
        let peer = FakePeer::dead();
        let bpmp = connect(&peer);
        let _ = bpmp.init();

        bpmp.suspend();
        assert_eq!(bpmp.resume(), Ok(()));
        assert_eq!(bpmp.state(), BpmpState::NotPresent);
    }

    #[test]
    fn illegal_transition_panics() {
        let peer = FakePeer::alive();
        let bpmp = connect(&peer);

        let result = catch_unwind(AssertUnwindSafe(|| bpmp.transition(BpmpState::SuspendEntry)));
        assert!(result.is_err());
        assert_eq!(bpmp.state(), BpmpState::Pending);
    }

    #[test]
    fn allowed_transitions() {
        use BpmpState::*;
        let all = [Pending, Complete, SuspendEntry, NotPresent];
        let allowed: Vec<_> = all
            .iter()
            .flat_map(|from| all.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_become(*to))
            .collect();
        assert_eq!(
            allowed,
            [
                (Pending, Complete),
                (Pending, NotPresent),
                (Complete, SuspendEntry),
                (SuspendEntry, Complete),
            ]
        );
    }
}
