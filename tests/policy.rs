// SPDX-License-Identifier: GPL-2.0
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! End-to-end policy flows through the public API.

mod common;

use common::{harness, mask_of};
use ias_core::{Cpumask, Pid, Policy, SchedError, SchedSpec, IAS_NPROC};

const LC2: SchedSpec = SchedSpec {
    guaranteed_cores: 2,
    max_cores: 4,
};
const BE0: SchedSpec = SchedSpec {
    guaranteed_cores: 0,
    max_cores: 2,
};

#[test]
fn attach_grants_sibling_pairs_lowest_first() {
    let mut sched = harness(8);

    let a = sched.proc_attach(Pid(100), &LC2).unwrap();
    let b = sched.proc_attach(Pid(200), &LC2).unwrap();

    let pa = sched.proc(a).unwrap();
    assert_eq!(pa.pid(), Pid(100));
    assert_eq!(pa.claimed_cores().iter().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(pa.threads_limit(), pa.threads_max());
    assert!(pa.is_lc());

    let pb = sched.proc(b).unwrap();
    assert_eq!(pb.claimed_cores().iter().collect::<Vec<_>>(), vec![2, 3]);
}

#[test]
fn guaranteed_placement_walks_the_reservation() {
    let mut sched = harness(4);
    let lc = sched.proc_attach(Pid(1), &LC2).unwrap();
    sched.sched_poll(1000, &Cpumask::new());

    sched.notify_core_needed(lc).unwrap();
    sched.notify_core_needed(lc).unwrap();

    assert_eq!(sched.core_owner(0), Some(lc));
    assert_eq!(sched.core_owner(1), Some(lc));
    assert_eq!(sched.proc(lc).unwrap().threads_active(), 2);
    // the policy drove the lower layer, not just its own tables
    assert_eq!(sched.ksched().run_log, vec![(Pid(1), 0), (Pid(1), 1)]);
}

#[test]
fn best_effort_expansion_follows_ipc_history() {
    let mut sched = harness(4);
    let lc = sched.proc_attach(Pid(1), &LC2).unwrap();
    sched.sched_poll(1000, &Cpumask::new());
    sched.notify_core_needed(lc).unwrap();
    sched.notify_core_needed(lc).unwrap();

    // a solo IPC sample gives the process a pairing baseline
    sched.ksched_mut().ipc[0] = Some(2.0);
    sched.sched_poll(1200, &Cpumask::new());

    // beyond the guarantee the process expands onto idle cores
    sched.notify_congested(lc, &mask_of(&[0]), &Cpumask::new());

    assert_eq!(sched.core_owner(2), Some(lc));
    assert_eq!(sched.proc(lc).unwrap().threads_active(), 3);
    assert!(!sched.proc(lc).unwrap().is_congested());
}

#[test]
fn congestion_without_placement_is_sticky() {
    let mut sched = harness(4);
    sched.proc_attach(Pid(1), &LC2).unwrap();
    let be = sched.proc_attach(Pid(2), &BE0).unwrap();
    sched.sched_poll(1000, &Cpumask::new());

    sched.notify_congested(be, &mask_of(&[0]), &Cpumask::new());
    assert!(sched.proc(be).unwrap().is_congested());

    // a later empty report clears it
    sched.notify_congested(be, &Cpumask::new(), &Cpumask::new());
    assert!(!sched.proc(be).unwrap().is_congested());
}

#[test]
fn unwanted_idle_cores_persist_across_ticks() {
    let mut sched = harness(4);
    sched.proc_attach(Pid(1), &LC2).unwrap();
    sched.sched_poll(1000, &mask_of(&[0, 1, 2, 3]));

    assert_eq!(sched.idle_cores().weight(), 4);
    sched.sched_poll(1100, &Cpumask::new());
    assert_eq!(sched.idle_cores().weight(), 4);
    for core in 0..4 {
        assert_eq!(sched.core_owner(core), None);
    }
}

#[test]
fn detach_frees_occupied_cores() {
    let mut sched = harness(4);
    let lc = sched.proc_attach(Pid(1), &LC2).unwrap();
    sched.sched_poll(1000, &Cpumask::new());
    sched.notify_core_needed(lc).unwrap();

    sched.proc_detach(lc);

    assert!(sched.proc(lc).is_none());
    assert_eq!(sched.nr_procs(), 0);
    assert_eq!(sched.core_owner(0), None);
}

#[test]
fn process_table_capacity_tracks_the_high_water_mark() {
    let mut sched = harness(4);
    let mut handles = Vec::new();
    for i in 0..IAS_NPROC {
        handles.push(sched.proc_attach(Pid(i as i32), &BE0).unwrap());
    }
    assert_eq!(
        sched.proc_attach(Pid(999), &BE0),
        Err(SchedError::NoSpace)
    );

    // an interior tombstone does not shrink the table, so the refusal
    // stands even though a slot is free
    sched.proc_detach(handles[3]);
    assert_eq!(
        sched.proc_attach(Pid(999), &BE0),
        Err(SchedError::NoSpace)
    );

    // freeing the top slot lowers the mark and lets a newcomer in
    sched.proc_detach(handles[IAS_NPROC - 1]);
    let idx = sched.proc_attach(Pid(999), &BE0).unwrap();
    assert_eq!(idx, 3);
}

#[test]
fn entry_points_map_to_errnos() {
    let mut sched = harness(4);
    let odd = SchedSpec {
        guaranteed_cores: 1,
        max_cores: 2,
    };
    assert_eq!(
        sched.proc_attach(Pid(1), &odd).unwrap_err().to_errno(),
        -libc::EINVAL
    );

    let too_big = SchedSpec {
        guaranteed_cores: 6,
        max_cores: 6,
    };
    assert_eq!(
        sched.proc_attach(Pid(1), &too_big).unwrap_err().to_errno(),
        -libc::ENOENT
    );

    sched.ksched_mut().avail = 0;
    let lc = sched.proc_attach(Pid(1), &LC2).unwrap();
    assert_eq!(
        sched.notify_core_needed(lc).unwrap_err().to_errno(),
        -libc::EBUSY
    );
}

#[test]
fn forced_idle_goes_through_the_lower_layer() {
    let mut sched = harness(4);
    let lc = sched.proc_attach(Pid(1), &LC2).unwrap();
    sched.sched_poll(1000, &Cpumask::new());
    sched.notify_core_needed(lc).unwrap();

    sched.idle_on_core(0).unwrap();

    assert_eq!(sched.core_owner(0), None);
    assert!(sched.idle_cores().test_cpu(0));
    assert_eq!(sched.proc(lc).unwrap().threads_active(), 0);
    assert_eq!(sched.ksched().idle_log, vec![0]);
}
