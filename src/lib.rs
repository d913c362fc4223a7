// SPDX-License-Identifier: GPL-2.0
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # IAS - the Interference-Aware Scheduler
//!
//! A user-space core-allocation policy for a kernel-bypass dataplane
//! iokernel. On every poll tick the policy decides which hardware cores run
//! which process's kthreads, balancing two workload classes:
//!
//! - **latency-critical (LC)** processes hold guaranteed core reservations,
//!   granted at attach time in hyperthread-pair granularity, and are placed
//!   only on their reserved cores;
//! - **best-effort (BE)** processes expand onto otherwise-idle cores and
//!   shrink again when the memory-bandwidth subcontroller tightens their
//!   thread limits.
//!
//! Placement is driven by a scoring function that combines reservation
//! priority, cache locality, and hyperthread-pairing quality: sibling
//! logical cores share physical resources, so the policy tracks the IPC
//! each process achieves against each possible sibling and prefers pairings
//! that have interfered the least.
//!
//! The policy is pure decision-making. It consumes a narrow [`Ksched`]
//! seam for the actual core wakeup/idle operations and perf sampling, and
//! exposes the [`Policy`] trait to the host's scheduler loop:
//!
//!```no_run
//!     use ias_core::{Cpumask, Ksched, Pid, Policy, SchedError, SchedSpec, Scheduler, Topology};
//!     # struct HostKsched;
//!     # impl Ksched for HostKsched {
//!     #     fn threads_avail(&self, _: Pid) -> usize { 0 }
//!     #     fn run_on_core(&mut self, _: Pid, _: usize) -> Result<(), SchedError> { Ok(()) }
//!     #     fn idle_on_core(&mut self, _: usize) -> Result<(), SchedError> { Ok(()) }
//!     #     fn core_ipc(&mut self, _: usize) -> Option<f64> { None }
//!     #     fn memory_bw(&mut self) -> f64 { 0.0 }
//!     # }
//!     let mut sched = Scheduler::new(HostKsched, Topology::detect().unwrap());
//!     let memcached = sched
//!         .proc_attach(Pid(801), &SchedSpec { guaranteed_cores: 4, max_cores: 8 })
//!         .unwrap();
//!     loop {
//!         let (now_us, idle) = (0u64, Cpumask::new()); // from the iokernel tick
//!         sched.sched_poll(now_us, &idle);
//!     }
//!```
//!
//! Everything runs on the iokernel's single polling thread; no entry point
//! blocks, and every call completes in work bounded by `NCPU * IAS_NPROC`.

pub mod bw;
pub mod cpumask;
mod ht;
pub mod ksched;
pub mod proc;
pub mod scheduler;
mod stats;
pub mod topology;
pub mod types;

pub use bw::BwStats;
pub use cpumask::Cpumask;
pub use ksched::Ksched;
pub use proc::Proc;
pub use scheduler::{Policy, Scheduler};
pub use topology::Topology;
pub use types::{Pid, ProcIdx, SchedError, SchedSpec};

/// Upper bound on hardware core ids the policy can manage.
pub const NCPU: usize = 128;

/// Maximum number of concurrently attached processes.
pub const IAS_NPROC: usize = 32;

/// Weight of the hyperthread-pairing term in the placement score.
pub const IAS_HT_WEIGHT: f64 = 0.25;

/// Cadence of the debug report, in microseconds.
pub const IAS_DEBUG_PRINT_US: u64 = 1_000_000;

/// Cadence of the memory-bandwidth subcontroller, in microseconds.
pub const IAS_BW_POLL_US: u64 = 100;

/// Cadence of the hyperthread IPC subcontroller, in microseconds.
pub const IAS_HT_POLL_US: u64 = 100;

/// Window over which the cache-locality score decays to zero, in
/// microseconds.
pub const IAS_LOC_DECAY_US: u64 = 200;

/// Weight of a new sample in the subcontrollers' moving averages.
pub const IAS_EWMA_FACTOR: f64 = 0.25;

/// Bandwidth (bytes per microsecond) above which the bandwidth
/// subcontroller starts revoking best-effort cores.
pub const IAS_BW_HIGH_WATERMARK: f64 = 22_000.0;

/// Bandwidth below which previously punished processes are relaxed.
pub const IAS_BW_LOW_WATERMARK: f64 = 18_000.0;
