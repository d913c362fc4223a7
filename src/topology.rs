// SPDX-License-Identifier: GPL-2.0
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Host core topology as the policy sees it: the hyperthread sibling map
//! and the mask of cores the policy may manage.
//!
//! Production hosts detect both from sysfs. Tests and simulations build
//! synthetic topologies with adjacent sibling pairs.

use std::path::PathBuf;

use anyhow::bail;
use anyhow::Result;
use glob::glob;
use log::warn;

use crate::cpumask::read_cpulist;
use crate::cpumask::Cpumask;
use crate::NCPU;

#[derive(Debug, Clone)]
pub struct Topology {
    /// `siblings[core]` is the other logical CPU on the same physical
    /// core, or `core` itself when SMT is off.
    siblings: Vec<usize>,
    allowed: Cpumask,
}

impl Topology {
    /// Detect the sibling pairs of every online CPU from sysfs. The
    /// allowed set starts as all online CPUs; hosts that hand only a
    /// subset of the machine to the dataplane call [`Topology::restrict`]
    /// afterwards.
    pub fn detect() -> Result<Topology> {
        let mut siblings: Vec<usize> = (0..NCPU).collect();
        let mut allowed = Cpumask::new();

        for entry in glob("/sys/devices/system/cpu/cpu[0-9]*")? {
            let path: PathBuf = entry?;
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            let cpu = match sscanf::sscanf!(name, "cpu{usize}") {
                Ok(cpu) => cpu,
                Err(_) => continue,
            };
            if cpu >= NCPU {
                bail!("cpu {} exceeds the supported maximum {}", cpu, NCPU);
            }

            // An unreadable sibling list means the CPU is offline; leave
            // it out of the allowed set.
            let list = match std::fs::read_to_string(path.join("topology/thread_siblings_list")) {
                Ok(list) => list,
                Err(_) => continue,
            };
            allowed.set_cpu(cpu)?;

            let members = read_cpulist(list.trim())?;
            if members.len() > 2 {
                warn!("cpu {} has {} thread siblings, pairing with the first", cpu, members.len());
            }
            if let Some(&sib) = members.iter().find(|&&m| m != cpu && m < NCPU) {
                siblings[cpu] = sib;
            }
        }

        if allowed.is_empty() {
            bail!("no online CPUs found");
        }
        Ok(Topology { siblings, allowed })
    }

    /// Build a topology of `nr_cores` cores with adjacent sibling pairs
    /// ({0,1}, {2,3}, ...). `nr_cores` must be even.
    pub fn synthetic(nr_cores: usize) -> Topology {
        assert!(nr_cores <= NCPU);
        assert!(nr_cores % 2 == 0);

        let mut siblings: Vec<usize> = (0..NCPU).collect();
        let mut allowed = Cpumask::new();
        for core in 0..nr_cores {
            siblings[core] = core ^ 1;
            allowed.set_cpu(core).unwrap();
        }
        Topology { siblings, allowed }
    }

    /// Shrink the allowed set to its intersection with `mask`, e.g. to the
    /// cores the host actually handed to the dataplane.
    pub fn restrict(&mut self, mask: &Cpumask) {
        self.allowed &= mask;
    }

    /// The hyperthread sibling of `core` (`core` itself without SMT).
    pub fn sibling(&self, core: usize) -> usize {
        self.siblings[core]
    }

    /// The cores the policy may manage.
    pub fn allowed(&self) -> &Cpumask {
        &self.allowed
    }
}
