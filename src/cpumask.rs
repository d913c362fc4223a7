// SPDX-License-Identifier: GPL-2.0
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Fixed-width CPU bit sets.
//!
//! A [`Cpumask`] covers the `NCPU` core-id space with a `BitVec` of u64
//! words and provides the primitives the placement loops are built from:
//! test/set/clear, popcount, find-first-cleared, and set-bit iteration.
//! Masks can also be parsed from hexadecimal strings (`0xf0`, `none`,
//! `all`) and from kernel cpulist syntax (`0-3,8`).

use std::fmt;
use std::ops::BitAndAssign;
use std::ops::BitOrAssign;
use std::ops::BitXorAssign;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use bitvec::prelude::*;

use crate::NCPU;

#[derive(Debug, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Cpumask {
    mask: BitVec<u64, Lsb0>,
}

impl Cpumask {
    fn check_cpu(cpu: usize) -> Result<()> {
        if cpu >= NCPU {
            bail!("invalid CPU {} passed, max {}", cpu, NCPU);
        }
        Ok(())
    }

    /// Build an empty mask.
    pub fn new() -> Cpumask {
        Cpumask {
            mask: bitvec![u64, Lsb0; 0; NCPU],
        }
    }

    /// Build a mask with every bit set.
    pub fn all() -> Cpumask {
        Cpumask {
            mask: bitvec![u64, Lsb0; 1; NCPU],
        }
    }

    /// Build a mask from a hexadecimal string. The special values `none`
    /// and `all` select the empty and the full mask.
    pub fn from_str(cpumask: &str) -> Result<Cpumask> {
        match cpumask {
            "none" => return Ok(Self::new()),
            "all" => return Ok(Self::all()),
            _ => {}
        }

        let mut hex_str = cpumask
            .strip_prefix("0x")
            .unwrap_or(cpumask)
            .replace('_', "");
        if hex_str.len() % 2 != 0 {
            hex_str.insert(0, '0');
        }
        let bytes =
            hex::decode(&hex_str).with_context(|| format!("failed to parse cpumask {cpumask}"))?;

        let mut mask = Self::new();
        for (index, &byte) in bytes.iter().rev().enumerate() {
            let mut val = byte;
            while val != 0 {
                let lsb = val.trailing_zeros() as usize;
                val &= !(1 << lsb);
                let cpu = index * 8 + lsb;
                if cpu >= NCPU {
                    bail!("cpu {} in cpumask {} exceeds maximum {}", cpu, cpumask, NCPU);
                }
                mask.mask.set(cpu, true);
            }
        }
        Ok(mask)
    }

    /// Build a mask from kernel cpulist syntax, e.g. `0-3,8`.
    pub fn from_cpulist(cpulist: &str) -> Result<Cpumask> {
        let mut mask = Cpumask::new();
        for cpu in read_cpulist(cpulist)? {
            Self::check_cpu(cpu)?;
            mask.mask.set(cpu, true);
        }
        Ok(mask)
    }

    /// Set a bit. Fails if `cpu` exceeds the mask width.
    pub fn set_cpu(&mut self, cpu: usize) -> Result<()> {
        Self::check_cpu(cpu)?;
        self.mask.set(cpu, true);
        Ok(())
    }

    /// Clear a bit. Fails if `cpu` exceeds the mask width.
    pub fn clear_cpu(&mut self, cpu: usize) -> Result<()> {
        Self::check_cpu(cpu)?;
        self.mask.set(cpu, false);
        Ok(())
    }

    /// Test a bit. Out-of-range ids read as unset.
    pub fn test_cpu(&self, cpu: usize) -> bool {
        match self.mask.get(cpu) {
            Some(bit) => *bit,
            None => false,
        }
    }

    /// Number of bits set.
    pub fn weight(&self) -> usize {
        self.mask.count_ones()
    }

    /// True if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.mask.count_ones() == 0
    }

    /// The mask width.
    pub fn len(&self) -> usize {
        NCPU
    }

    /// Lowest id whose bit is cleared, searching upward from `from`.
    pub fn next_cleared(&self, from: usize) -> Option<usize> {
        (from..NCPU).find(|&cpu| !self.mask[cpu])
    }

    /// The bitwise complement of this mask.
    pub fn not(&self) -> Cpumask {
        let mut new = self.clone();
        new.mask = !new.mask;
        new
    }

    /// The intersection of this mask and `other`.
    pub fn and(&self, other: &Cpumask) -> Cpumask {
        let mut new = self.clone();
        new.mask &= &other.mask;
        new
    }

    /// The union of this mask and `other`.
    pub fn or(&self, other: &Cpumask) -> Cpumask {
        let mut new = self.clone();
        new.mask |= &other.mask;
        new
    }

    /// The symmetric difference of this mask and `other`.
    pub fn xor(&self, other: &Cpumask) -> Cpumask {
        let mut new = self.clone();
        new.mask ^= &other.mask;
        new
    }

    /// Iterate over the ids of the set bits, ascending.
    pub fn iter(&self) -> CpumaskIterator<'_> {
        CpumaskIterator {
            mask: self,
            index: 0,
        }
    }
}

pub struct CpumaskIterator<'a> {
    mask: &'a Cpumask,
    index: usize,
}

impl Iterator for CpumaskIterator<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < NCPU {
            let index = self.index;
            self.index += 1;
            if self.mask.test_cpu(index) {
                return Some(index);
            }
        }
        None
    }
}

/// Parse kernel cpulist syntax (`0,6` or `0-2,6-8` or `3`) into core ids.
pub fn read_cpulist(cpulist: &str) -> Result<Vec<usize>> {
    let cpulist = cpulist.trim_end_matches('\0');
    let mut cpu_ids = vec![];
    for group in cpulist.split(',') {
        let (min, max) = match sscanf::sscanf!(group.trim(), "{usize}-{usize}") {
            Ok((min, max)) => (min, max),
            Err(_) => match sscanf::sscanf!(group.trim(), "{usize}") {
                Ok(single) => (single, single),
                Err(_) => bail!("failed to parse cpulist {}", group.trim()),
            },
        };
        for cpu in min..=max {
            cpu_ids.push(cpu);
        }
    }
    Ok(cpu_ids)
}

impl fmt::Display for Cpumask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = self.mask.as_raw_slice();
        for (i, word) in words.iter().enumerate().rev() {
            if i == words.len() - 1 {
                write!(f, "{word:x}")?;
            } else {
                write!(f, ",{word:016x}")?;
            }
        }
        Ok(())
    }
}

impl BitAndAssign<&Self> for Cpumask {
    fn bitand_assign(&mut self, rhs: &Self) {
        self.mask &= &rhs.mask;
    }
}

impl BitOrAssign<&Self> for Cpumask {
    fn bitor_assign(&mut self, rhs: &Self) {
        self.mask |= &rhs.mask;
    }
}

impl BitXorAssign<&Self> for Cpumask {
    fn bitxor_assign(&mut self, rhs: &Self) {
        self.mask ^= &rhs.mask;
    }
}
