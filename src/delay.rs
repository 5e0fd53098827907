// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Busy-wait delays and the bounded polling used by the mailbox protocols.

use crate::sysregs::{TimerControl, read_cntps_tval_el1, write_cntps_ctl_el1};
use core::fmt::{self, Display, Formatter};

const MICROS_PER_SECOND: u32 = 1_000_000;

/// Something that can spin for a given amount of time.
pub trait Delay {
    /// Spins for at least `us` microseconds.
    fn delay_us(&self, us: u32);

    /// Spins for at least `ms` milliseconds.
    fn delay_ms(&self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1000);
        }
    }
}

impl<T: Delay + ?Sized> Delay for &T {
    fn delay_us(&self, us: u32) {
        (**self).delay_us(us)
    }

    fn delay_ms(&self, ms: u32) {
        (**self).delay_ms(ms)
    }
}

/// A bounded poll gave up before its condition became true.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Timeout {
    /// The number of times the condition was checked.
    pub attempts: u32,
}

impl Display for Timeout {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "condition not met after {} attempts", self.attempts)
    }
}

/// Checks `done` up to `bound` times, waiting `interval_ms` after each failed check.
///
/// Returns the number of failed checks before `done` returned true, or [`Timeout`] if it never
/// did.
pub fn poll_until(
    delay: &impl Delay,
    interval_ms: u32,
    bound: u32,
    mut done: impl FnMut() -> bool,
) -> Result<u32, Timeout> {
    for attempt in 0..bound {
        if done() {
            return Ok(attempt);
        }
        delay.delay_ms(interval_ms);
    }
    Err(Timeout { attempts: bound })
}

/// A free-running counter which counts down.
pub trait CountdownTimer {
    /// Returns the current counter value.
    fn value(&self) -> u32;
}

/// The EL3 secure physical timer, read as a down counter.
///
/// `CNTPS_TVAL_EL1` counts down while the timer is enabled, so its complement is read to get a
/// monotonically decreasing value.
#[derive(Debug)]
pub struct SecurePhysicalTimer;

impl SecurePhysicalTimer {
    /// Starts the counter running, with its interrupt masked.
    pub fn enable(&self) {
        write_cntps_ctl_el1(TimerControl::ENABLE | TimerControl::IMASK);
    }
}

impl CountdownTimer for SecurePhysicalTimer {
    fn value(&self) -> u32 {
        !(read_cntps_tval_el1() as u32)
    }
}

/// Microsecond delays driven by a [`CountdownTimer`] ticking at a fixed frequency.
#[derive(Debug)]
pub struct TimerDelay<T: CountdownTimer> {
    timer: T,
    /// Microseconds per `divider` ticks, after common factors of 10 have been removed.
    multiplier: u32,
    divider: u32,
}

impl<T: CountdownTimer> TimerDelay<T> {
    /// Creates a delay source for `timer`, which ticks at `frequency` Hz.
    pub const fn new(timer: T, frequency: u32) -> Self {
        let (multiplier, divider) = reduce_ratio(MICROS_PER_SECOND, frequency);
        Self {
            timer,
            multiplier,
            divider,
        }
    }

    /// Returns the underlying timer.
    pub fn timer(&self) -> &T {
        &self.timer
    }

    fn ticks_for(&self, us: u32) -> u64 {
        (u64::from(us) * u64::from(self.divider)).div_ceil(u64::from(self.multiplier))
    }
}

impl<T: CountdownTimer> Delay for TimerDelay<T> {
    fn delay_us(&self, us: u32) {
        let start = self.timer.value();
        let total = self.ticks_for(us);
        while u64::from(start.wrapping_sub(self.timer.value())) < total {}
    }
}

/// Divides both values by 10 for as long as both are multiples of 10, so that the later
/// multiplication doesn't overflow.
const fn reduce_ratio(mut multiplier: u32, mut divider: u32) -> (u32, u32) {
    while multiplier % 10 == 0 && divider % 10 == 0 {
        multiplier /= 10;
        divider /= 10;
    }
    (multiplier, divider)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::Delay;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A delay which returns immediately, and counts how long it was asked to wait.
    #[derive(Debug, Default)]
    pub struct FakeDelay {
        pub elapsed_us: AtomicU32,
    }

    impl FakeDelay {
        pub fn elapsed_ms(&self) -> u32 {
            self.elapsed_us.load(Ordering::SeqCst) / 1000
        }
    }

    impl Delay for FakeDelay {
        fn delay_us(&self, us: u32) {
            self.elapsed_us.fetch_add(us, Ordering::SeqCst);
        }
    }
}
