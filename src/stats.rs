// SPDX-License-Identifier: GPL-2.0
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Periodic debug report.
//!
//! Emitted through the host log on the `IAS_DEBUG_PRINT_US` cadence: one
//! line per process with its flags and thread counts, one line per process
//! pair with the observed pairing IPC, and a trailing line with the
//! bandwidth-controller counters.

use log::info;

use crate::ksched::Ksched;
use crate::proc::Proc;
use crate::scheduler::Scheduler;

pub(crate) fn print_debug_info<K: Ksched>(sched: &Scheduler<K>) {
    for p in sched.attached() {
        info!("{}", proc_line(p));
        for other in sched.attached() {
            info!("{}", pair_line(p, other));
        }
    }
    let bw = sched.bw_stats();
    info!(
        "bw_cur {:.6} bw_punish {} bw_relax {}",
        bw.bw_cur, bw.bw_punish, bw.bw_relax
    );
}

fn proc_line(p: &Proc) -> String {
    format!(
        "PID {}: {}{} ACTIVE {}, LIMIT {}, MAX {}, IPC {:.6}",
        p.pid(),
        if p.is_congested() { "C" } else { "_" },
        if p.is_bwlimited() { "B" } else { "_" },
        p.threads_active(),
        p.threads_limit(),
        p.threads_max(),
        p.ht_max_ipc()
    )
}

fn pair_line(p: &Proc, other: &Proc) -> String {
    format!(
        "PID {}x{}: IPC {:.6}",
        p.pid(),
        other.pid(),
        p.pairing_ipc(other.idx())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Pid, SchedSpec};

    #[test]
    fn proc_line_format() {
        let mut p = Proc::new(
            Pid(42),
            0,
            &SchedSpec {
                guaranteed_cores: 2,
                max_cores: 6,
            },
        );
        p.threads_active = 3;
        p.threads_limit = 4;
        p.is_congested = true;
        p.ht_max_ipc = 1.5;
        assert_eq!(
            proc_line(&p),
            "PID 42: C_ ACTIVE 3, LIMIT 4, MAX 6, IPC 1.500000"
        );

        p.is_congested = false;
        p.is_bwlimited = true;
        assert_eq!(
            proc_line(&p),
            "PID 42: _B ACTIVE 3, LIMIT 4, MAX 6, IPC 1.500000"
        );
    }

    #[test]
    fn pair_line_format() {
        let spec = SchedSpec {
            guaranteed_cores: 0,
            max_cores: 2,
        };
        let mut a = Proc::new(Pid(1), 0, &spec);
        let b = Proc::new(Pid(2), 1, &spec);
        a.ht_pairing_ipc[1] = 0.75;
        assert_eq!(pair_line(&a, &b), "PID 1x2: IPC 0.750000");
    }
}
