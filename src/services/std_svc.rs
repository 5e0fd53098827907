// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The standard secure service: its own queries, with power management calls delegated.

use crate::{
    error::Error,
    services::{Service, owns},
    smccc::{OwningEntityNumber, SMC_UNK, SmcCall, SmcReturn},
};
use log::warn;
use uuid::{Uuid, uuid};

const STD_SVC_CALL_COUNT: u32 = 0x8400_ff00;
const STD_SVC_UID: u32 = 0x8400_ff01;
const STD_SVC_VERSION: u32 = 0x8400_ff03;

const STD_SVC_VERSION_MAJOR: u64 = 0;
const STD_SVC_VERSION_MINOR: u64 = 1;

/// The number of PSCI calls reported by the call count query.
pub const PSCI_NUM_CALLS: u32 = 18;

/// The highest function number of the PSCI range.
const PSCI_FID_LAST: u16 = 0x1f;

const STD_SVC_UUID: Uuid = uuid!("108d905b-f863-47e8-ae2d-c0fb5641f6e2");

/// The generic PSCI implementation, which handles power management calls.
pub trait PowerStateCoordinator: Sync {
    /// Sets up the power domain tree. Called once at startup.
    fn init(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Handles a PSCI call.
    fn handle_psci_call(&self, call: &SmcCall) -> SmcReturn;
}

/// Standard secure service calls.
pub struct StandardService<'a> {
    coordinator: &'a dyn PowerStateCoordinator,
}

impl<'a> StandardService<'a> {
    /// Creates a standard service delegating power management calls to the given coordinator.
    pub const fn new(coordinator: &'a dyn PowerStateCoordinator) -> Self {
        Self { coordinator }
    }
}

impl Service for StandardService<'_> {
    owns!(OwningEntityNumber::STANDARD_SECURE);

    fn init(&self) -> Result<(), Error> {
        self.coordinator.init()
    }

    fn handle(&self, call: &SmcCall) -> SmcReturn {
        if call.function.number() <= PSCI_FID_LAST {
            return self.coordinator.handle_psci_call(call);
        }

        match call.function.0 {
            STD_SVC_CALL_COUNT => PSCI_NUM_CALLS.into(),
            STD_SVC_UID => STD_SVC_UUID.into(),
            STD_SVC_VERSION => [STD_SVC_VERSION_MAJOR, STD_SVC_VERSION_MINOR].into(),
            _ => {
                warn!("Unimplemented standard service call {}", call.function);
                SMC_UNK.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCoordinator {
        calls: Mutex<Vec<u32>>,
    }

    impl PowerStateCoordinator for RecordingCoordinator {
        fn init(&self) -> Result<(), Error> {
            Err(Error::NotReady)
        }

        fn handle_psci_call(&self, call: &SmcCall) -> SmcReturn {
            self.calls.lock().unwrap().push(call.function.0);
            (-2i32).into()
        }
    }

    #[test]
    fn call_count() {
        let coordinator = RecordingCoordinator::default();
        let service = StandardService::new(&coordinator);
        assert_eq!(
            service.handle(&SmcCall::new(STD_SVC_CALL_COUNT, &[])).values(),
            [18]
        );
    }

    #[test]
    fn uid() {
        let coordinator = RecordingCoordinator::default();
        let service = StandardService::new(&coordinator);
        assert_eq!(
            service.handle(&SmcCall::new(STD_SVC_UID, &[])).values(),
            [0x5b90_8d10, 0xe847_63f8, 0xfbc0_2dae, 0xe2f6_4156]
        );
    }

    #[test]
    fn version() {
        let coordinator = RecordingCoordinator::default();
        let service = StandardService::new(&coordinator);
        assert_eq!(
            service.handle(&SmcCall::new(STD_SVC_VERSION, &[])).values(),
            [0, 1]
        );
    }

    #[test]
    fn psci_calls_delegated() {
        let coordinator = RecordingCoordinator::default();
        let service = StandardService::new(&coordinator);

        // PSCI_VERSION, CPU_ON (SMC64) and the last number of the range.
        for function in [0x8400_0000, 0xC400_0003, 0x8400_001f] {
            assert_eq!(
                service.handle(&SmcCall::new(function, &[])).values(),
                [(-2i64) as u64]
            );
        }
        assert_eq!(
            *coordinator.calls.lock().unwrap(),
            [0x8400_0000, 0xC400_0003, 0x8400_001f]
        );
    }

    #[test]
    fn unknown_standard_call() {
        let coordinator = RecordingCoordinator::default();
        let service = StandardService::new(&coordinator);
        assert_eq!(
            service.handle(&SmcCall::new(0x8400_0020, &[])).values(),
            [u64::MAX]
        );
        assert_eq!(
            service.handle(&SmcCall::new(0x8400_ff02, &[])).values(),
            [u64::MAX]
        );
        assert!(coordinator.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn init_delegated() {
        let coordinator = RecordingCoordinator::default();
        let service = StandardService::new(&coordinator);
        assert_eq!(service.init(), Err(Error::NotReady));
    }
}
