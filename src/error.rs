// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Errors returned by the BPMP, MCE and SiP layers.

use crate::smccc::SmcReturn;
use core::fmt::{self, Display, Formatter};

/// Bad address.
pub const EFAULT: i32 = 14;
/// Invalid argument.
pub const EINVAL: i32 = 22;
/// Operation not supported.
pub const ENOTSUP: i32 = 45;
/// Operation timed out.
pub const ETIMEDOUT: i32 = 60;

/// An error from one of the power coordination engines.
///
/// Each variant maps to a negative errno value, which is what gets reported to the caller of an
/// SMC.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The hardware did not respond within the bounded poll.
    TimedOut,
    /// The operation was attempted before the handshake completed, or the peer is known absent.
    NotReady,
    /// An id, enumerator or index was out of range. Nothing was sent to the hardware.
    InvalidArgument,
    /// The request is valid but can't be honoured in the current configuration.
    NotSupported,
    /// An address provided by the caller lies outside the memory it is allowed to name.
    BadAddress,
    /// The BPMP handled the request but answered with the given non-zero response code.
    Rejected(i32),
}

impl Error {
    /// Returns the negative errno value for the error.
    pub const fn errno(self) -> i32 {
        match self {
            Self::TimedOut => -ETIMEDOUT,
            Self::NotReady | Self::InvalidArgument => -EINVAL,
            Self::NotSupported => -ENOTSUP,
            Self::BadAddress => -EFAULT,
            Self::Rejected(code) => code,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::TimedOut => write!(f, "timed out"),
            Self::NotReady => write!(f, "not ready"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NotSupported => write!(f, "not supported"),
            Self::BadAddress => write!(f, "bad address"),
            Self::Rejected(code) => write!(f, "rejected with code {code}"),
        }
    }
}

impl From<Error> for SmcReturn {
    fn from(error: Error) -> Self {
        error.errno().into()
    }
}
