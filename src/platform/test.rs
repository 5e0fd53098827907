// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

use super::Platform;
use crate::{gicv2::GicConfig, logger::LogSink, services::arch::WorkaroundSupport};
use arm_sysregs::MpidrEl1;
use core::fmt;
use percore::ExceptionFree;
use std::io::{Write, stdout};

const CORES_PER_CLUSTER: usize = 2;

/// A fake platform for unit tests, shaped like Tegra194: four clusters of two cores.
pub struct TestPlatform;

impl TestPlatform {
    /// The MPIDR values for each core, for use in tests.
    pub const MPIDR_VALUES: [MpidrEl1; Self::CORE_COUNT] = [
        MpidrEl1::from_bits_retain(0x0000_0000_0000_0000),
        MpidrEl1::from_bits_retain(0x0000_0000_0000_0001),
        MpidrEl1::from_bits_retain(0x0000_0000_0000_0100),
        MpidrEl1::from_bits_retain(0x0000_0000_0000_0101),
        MpidrEl1::from_bits_retain(0x0000_0000_0000_0200),
        MpidrEl1::from_bits_retain(0x0000_0000_0000_0201),
        MpidrEl1::from_bits_retain(0x0000_0000_0000_0300),
        MpidrEl1::from_bits_retain(0x0000_0000_0000_0301),
    ];
}

// SAFETY: The test platform is exempt from the usual safety requirements on `core_position`,
// because it is only used in unit tests and so `TestPlatform::core_position` is never called from
// assembly code.
unsafe impl Platform for TestPlatform {
    const CORE_COUNT: usize = 8;
    const CLUSTER_COUNT: usize = 4;
    const CACHE_WRITEBACK_GRANULE: usize = 1 << 6;

    const GIC_CONFIG: GicConfig = GicConfig {
        secure_interrupts: &[],
    };

    type LogSinkImpl = StdOutSink;

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

/// This is a fake version of `percore::exception_free` for use in unit tests only, which must be
/// run on a single thread.
pub fn exception_free<T>(f: impl FnOnce(ExceptionFree) -> T) -> T {
    // SAFETY: This is only used in unit tests, which are run on the host where there are no
    // hardware exceptions nor multiple threads.
    let token = unsafe { ExceptionFree::new() };
    f(token)
}

/// A log sink for tests which writes logs to standard output.
pub struct StdOutSink;

impl LogSink for StdOutSink {
    fn write_fmt(&self, args: fmt::Arguments) {
        stdout().write_fmt(args).unwrap();
    }

    fn flush(&self) {
        stdout().flush().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_positions_are_unique_and_dense() {
        for (index, mpidr) in TestPlatform::MPIDR_VALUES.iter().enumerate() {
            assert_eq!(TestPlatform::core_position(mpidr.bits()), index);
        }
    }

    #[test]
    fn stdout_sink() {
        let writer = StdOutSink;
        writeln!(writer, "hello");
    }
}
