// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Routing of SMCs to the services which own them.

pub mod arch;
pub mod sip;
pub mod std_svc;

use crate::{
    context::{GpRegs, World},
    error::Error,
    smccc::{FunctionId, OwningEntityNumber, SMC_UNK, SmcCall, SmcReturn, SmcccCallType},
};
use arrayvec::ArrayVec;
use core::fmt::{self, Display, Formatter};
use log::{debug, error, info};

/// Helper macro to define the range of owning entity numbers and the call kind covered by a
/// service.
#[macro_export]
macro_rules! owns {
    // service handles fast calls of a single Owning Entity Number (OEN)
    ($owning_entity:expr) => {
        $crate::owns!($owning_entity, $owning_entity, $crate::services::CallKind::Fast);
    };
    // service handles calls of the given kind for an inclusive range of OENs
    ($start:expr, $end:expr, $kind:expr) => {
        fn ownership(&self) -> $crate::services::Ownership {
            $crate::services::Ownership {
                start: $start,
                end: $end,
                kind: $kind,
            }
        }
    };
}
pub(crate) use owns;

/// The maximum number of services a dispatch table can hold.
pub const MAX_SERVICES: usize = 8;

/// Whether a call is fast or yielding, for the purpose of routing it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CallKind {
    /// SMC32 or SMC64 fast calls.
    Fast,
    /// Yielding calls.
    Yielding,
}

impl CallKind {
    const COUNT: usize = 2;

    fn index(self) -> usize {
        match self {
            Self::Fast => 0,
            Self::Yielding => 1,
        }
    }
}

impl From<SmcccCallType> for CallKind {
    fn from(call_type: SmcccCallType) -> Self {
        if call_type.is_fast() {
            Self::Fast
        } else {
            Self::Yielding
        }
    }
}

/// The function IDs a service claims: an inclusive range of owning entity numbers, for one kind
/// of call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Ownership {
    /// The first owning entity number of the range.
    pub start: OwningEntityNumber,
    /// The last owning entity number of the range.
    pub end: OwningEntityNumber,
    /// Which kind of call the range covers.
    pub kind: CallKind,
}

impl Ownership {
    fn oens(&self) -> impl Iterator<Item = usize> {
        usize::from(self.start.0)..=usize::from(self.end.0)
    }

    fn is_valid(&self) -> bool {
        self.start <= self.end && usize::from(self.end.0) < OwningEntityNumber::COUNT
    }
}

/// A service which handles some range of SMC calls.
///
/// According to SMCCC v1.3+ the implementation must disregard the SVE hint bit in the function ID
/// and consider it to be 0 for the purpose of function identification. The dispatcher clears it
/// before calling `handle`.
pub trait Service: Sync {
    /// Returns the range of function IDs this service handles.
    fn ownership(&self) -> Ownership;

    /// Sets up the service. Called once when the dispatch table is initialised; if it fails, the
    /// service's calls are treated as unknown from then on.
    fn init(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Handles the given SMC call.
    fn handle(&self, call: &SmcCall) -> SmcReturn;
}

/// An error registering a service in a [`DispatchTable`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DispatchError {
    /// The service's range overlaps one that is already registered, or is empty.
    Overlap(Ownership),
    /// The table has no room for another service.
    Full,
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Overlap(ownership) => write!(
                f,
                "{:?} calls for OENs {}..={} overlap another service",
                ownership.kind, ownership.start, ownership.end
            ),
            Self::Full => write!(f, "too many services"),
        }
    }
}

struct Entry<'a> {
    service: &'a dyn Service,
    enabled: bool,
}

/// Routes SMCs to the registered services by owning entity number and call kind.
pub struct DispatchTable<'a> {
    entries: ArrayVec<Entry<'a>, MAX_SERVICES>,
    index: [[Option<u8>; CallKind::COUNT]; OwningEntityNumber::COUNT],
}

impl<'a> DispatchTable<'a> {
    /// Creates an empty table, in which every call is unknown.
    pub const fn new() -> Self {
        Self {
            entries: ArrayVec::new_const(),
            index: [[None; CallKind::COUNT]; OwningEntityNumber::COUNT],
        }
    }

    /// Adds the given service to the table.
    pub fn register(&mut self, service: &'a dyn Service) -> Result<(), DispatchError> {
        let ownership = service.ownership();
        if !ownership.is_valid()
            || ownership
                .oens()
                .any(|oen| self.index[oen][ownership.kind.index()].is_some())
        {
            return Err(DispatchError::Overlap(ownership));
        }
        if self.entries.is_full() {
            return Err(DispatchError::Full);
        }

        let position = self.entries.len() as u8;
        self.entries.push(Entry {
            service,
            enabled: true,
        });
        for oen in ownership.oens() {
            self.index[oen][ownership.kind.index()] = Some(position);
        }
        Ok(())
    }

    /// Runs the `init` of every registered service, disabling any which fail.
    pub fn init(&mut self) {
        for entry in &mut self.entries {
            let ownership = entry.service.ownership();
            match entry.service.init() {
                Ok(()) => {
                    debug!(
                        "Initialised {:?} service for OENs {}..={}",
                        ownership.kind, ownership.start, ownership.end
                    );
                }
                Err(e) => {
                    error!(
                        "Failed to initialise service for OENs {}..={}: {e}",
                        ownership.start, ownership.end
                    );
                    entry.enabled = false;
                }
            }
        }
        info!("{} SMC services registered", self.entries.len());
    }

    /// Returns the enabled service which owns the given function ID, if any.
    fn lookup(&self, function: FunctionId) -> Option<&'a dyn Service> {
        if !function.valid() {
            return None;
        }
        let kind = CallKind::from(function.call_type());
        let position = self.index[usize::from(function.oen().0)][kind.index()]?;
        let entry = &self.entries[usize::from(position)];
        entry.enabled.then_some(entry.service)
    }

    /// Handles the given call, returning the unknown function sentinel if no service owns it.
    pub fn handle(&self, call: &SmcCall) -> SmcReturn {
        let mut call = call.clone();
        call.function.clear_sve_hint();
        match self.lookup(call.function) {
            Some(service) => service.handle(&call),
            None => {
                debug!("Unknown SMC {:?} from {:?}", call.function, call.world);
                SMC_UNK.into()
            }
        }
    }

    /// Handles the SMC whose function ID and arguments are in the given saved registers, and
    /// writes the result back to them.
    ///
    /// Only the registers the result uses are written. An unknown call only writes x0.
    pub fn dispatch(&self, regs: &mut GpRegs, world: World, cookie: u64) {
        let result = self.handle(&SmcCall::from_regs(regs, world, cookie));
        regs.write_return_value(&result);
    }
}

impl Default for DispatchTable<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::Error,
        services::arch::{Arch, SMCCC_VERSION, SMCCC_VERSION_1_1},
        smccc::{NOT_SUPPORTED, SUCCESS},
    };

    struct EchoService {
        ownership: Ownership,
        init_result: Result<(), Error>,
    }

    impl EchoService {
        const fn new(start: u8, end: u8, kind: CallKind) -> Self {
            Self {
                ownership: Ownership {
                    start: OwningEntityNumber(start),
                    end: OwningEntityNumber(end),
                    kind,
                },
                init_result: Ok(()),
            }
        }
    }

    impl Service for EchoService {
        fn ownership(&self) -> Ownership {
            self.ownership
        }

        fn init(&self) -> Result<(), Error> {
            self.init_result
        }

        fn handle(&self, call: &SmcCall) -> SmcReturn {
            [u64::from(call.function.0), call.arg(1), call.cookie].into()
        }
    }

    struct OemService;

    impl Service for OemService {
        owns!(OwningEntityNumber::OEM);

        fn handle(&self, _call: &SmcCall) -> SmcReturn {
            SUCCESS.into()
        }
    }

    /// Tests the SMCCC arch version call as a simple example of SMC dispatch.
    ///
    /// The point of this isn't to test every individual SMC call, just that the common code in
    /// `dispatch` works. Individual SMC calls can be tested directly within their modules.
    #[test]
    fn dispatch_arch_version() {
        let arch = Arch;
        let mut table = DispatchTable::new();
        table.register(&arch).unwrap();
        table.init();

        let mut function = FunctionId(SMCCC_VERSION);
        // Set the SVE hint bit to test if the dispatcher treats this correctly.
        function.0 |= 1 << 16;
        let mut regs = GpRegs::EMPTY;
        regs.registers[0] = function.0.into();

        table.dispatch(&mut regs, World::NonSecure, 0);
        assert_eq!(regs.registers[0], SMCCC_VERSION_1_1 as u64);
    }

    #[test]
    fn unknown_call_only_writes_x0() {
        let table = DispatchTable::new();
        let mut regs = GpRegs::EMPTY;
        regs.registers[..5].copy_from_slice(&[0x8300_0001, 11, 12, 13, 14]);

        table.dispatch(&mut regs, World::NonSecure, 0);
        assert_eq!(regs.registers[..5], [NOT_SUPPORTED as u64, 11, 12, 13, 14]);
        assert_eq!(regs.registers[0], u64::MAX);
    }

    #[test]
    fn routes_by_oen_and_kind() {
        let fast = EchoService::new(3, 5, CallKind::Fast);
        let yielding = EchoService::new(3, 3, CallKind::Yielding);
        let mut table = DispatchTable::new();
        table.register(&fast).unwrap();
        table.register(&yielding).unwrap();

        let mut call = SmcCall::new(0x8500_0010, &[42]);
        call.cookie = 7;
        assert_eq!(table.handle(&call).values(), [0x8500_0010, 42, 7]);
        assert_eq!(
            table.handle(&SmcCall::new(0x0300_0001, &[1])).values(),
            [0x0300_0001, 1, 0]
        );
        // Yielding calls for OEN 4 have no owner.
        assert_eq!(
            table.handle(&SmcCall::new(0x0400_0001, &[])).values(),
            [SMC_UNK as u64]
        );
        assert_eq!(
            table.handle(&SmcCall::new(0x8600_0001, &[])).values(),
            [SMC_UNK as u64]
        );
    }

    #[test]
    fn handlers_see_cleared_sve_hint() {
        let fast = EchoService::new(3, 3, CallKind::Fast);
        let mut table = DispatchTable::new();
        table.register(&fast).unwrap();

        assert_eq!(
            table.handle(&SmcCall::new(0xC301_0002, &[])).values(),
            [0xC300_0002, 0, 0]
        );
    }

    #[test]
    fn reserved_bits_are_unknown() {
        let fast = EchoService::new(3, 3, CallKind::Fast);
        let mut table = DispatchTable::new();
        table.register(&fast).unwrap();

        assert_eq!(
            table.handle(&SmcCall::new(0x8302_0000, &[])).values(),
            [SMC_UNK as u64]
        );
    }

    #[test]
    fn overlapping_ranges_rejected() {
        let first = EchoService::new(2, 4, CallKind::Fast);
        let second = EchoService::new(4, 6, CallKind::Fast);
        let yielding = EchoService::new(4, 6, CallKind::Yielding);
        let oem = OemService;
        let mut table = DispatchTable::new();

        table.register(&first).unwrap();
        assert_eq!(
            table.register(&second),
            Err(DispatchError::Overlap(second.ownership))
        );
        assert_eq!(
            table.register(&oem),
            Err(DispatchError::Overlap(oem.ownership()))
        );
        table.register(&yielding).unwrap();
    }

    #[test]
    fn reversed_range_rejected() {
        let reversed = EchoService::new(5, 2, CallKind::Fast);
        let mut table = DispatchTable::new();
        assert!(matches!(
            table.register(&reversed),
            Err(DispatchError::Overlap(_))
        ));
    }

    #[test]
    fn table_capacity() {
        let services: Vec<EchoService> = (0..=MAX_SERVICES as u8)
            .map(|oen| EchoService::new(oen, oen, CallKind::Fast))
            .collect();
        let mut table = DispatchTable::new();
        for service in &services[..MAX_SERVICES] {
            table.register(service).unwrap();
        }
        assert_eq!(
            table.register(&services[MAX_SERVICES]),
            Err(DispatchError::Full)
        );
    }

    #[test]
    fn failed_init_disables_service() {
        let mut broken = EchoService::new(3, 3, CallKind::Fast);
        broken.init_result = Err(Error::TimedOut);
        let working = EchoService::new(4, 4, CallKind::Fast);
        let mut table = DispatchTable::new();
        table.register(&broken).unwrap();
        table.register(&working).unwrap();
        table.init();

        assert_eq!(
            table.handle(&SmcCall::new(0x8300_0001, &[])).values(),
            [SMC_UNK as u64]
        );
        assert_eq!(
            table.handle(&SmcCall::new(0x8400_0001, &[5])).values(),
            [0x8400_0001, 5, 0]
        );
    }
}
