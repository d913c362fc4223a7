// SPDX-License-Identifier: GPL-2.0
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Identifiers, attach-time configuration, and the policy error type.

use std::fmt;

/// Opaque process identifier supplied by the host's process abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub i32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry handle for an attached process. Returned by `proc_attach` and
/// passed back into every other policy entry point.
pub type ProcIdx = usize;

/// Core reservation request made at attach time.
///
/// `guaranteed_cores` must be even: reservations are granted in
/// hyperthread-pair granularity so a latency-critical process never shares
/// a physical core with a stranger.
#[derive(Debug, Clone, Copy)]
pub struct SchedSpec {
    pub guaranteed_cores: usize,
    pub max_cores: usize,
}

/// Errors reported at the policy entry points.
///
/// `Busy` and `NoSpace` are expected outcomes of a loaded system and are
/// never logged at error severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Caller-supplied configuration is malformed.
    Invalid,
    /// Capacity exhausted: process table full, no claimed-core pair left,
    /// no core selectable, or the process is at its thread limit.
    NoSpace,
    /// The lower scheduler refused the action; transient.
    Busy,
    /// Memory exhaustion while creating a process descriptor.
    Allocation,
}

impl SchedError {
    /// Negative errno for hosts speaking the C vtable convention.
    pub fn to_errno(self) -> i32 {
        match self {
            SchedError::Invalid => -libc::EINVAL,
            SchedError::NoSpace => -libc::ENOENT,
            SchedError::Busy => -libc::EBUSY,
            SchedError::Allocation => -libc::ENOMEM,
        }
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SchedError::Invalid => "invalid configuration",
            SchedError::NoSpace => "capacity exhausted",
            SchedError::Busy => "temporarily unavailable",
            SchedError::Allocation => "out of memory",
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for SchedError {}
