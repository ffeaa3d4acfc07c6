// SPDX-License-Identifier: GPL-3.0-only

//! Swap sizing

use procfs::{Current, Meminfo};

use crate::Result;
use node_sys::SysError;

/// Recommended swap for a machine with `ram_gb` of memory, in MB.
pub fn base_swap_size(ram_gb: u64) -> u64 {
    match ram_gb {
        0..4 => 2048,
        4..16 => 4096,
        16..64 => 8192,
        _ => 16384,
    }
}

/// Swap in MB: the base size plus `overcommit` times the RAM.
pub fn calculate_swap_size(mem_mb: u64, overcommit: f64) -> u64 {
    let overcommit_swap = (mem_mb as f64 * overcommit).round().max(0.0) as u64;
    base_swap_size(mem_mb / 1024) + overcommit_swap
}

/// Total RAM in MB as reported by `/proc/meminfo`.
pub fn mem_total_mb() -> Result<u64> {
    let meminfo = Meminfo::current()
        .map_err(|e| SysError::OperationFailed(format!("reading /proc/meminfo: {e}")))?;
    Ok(meminfo.mem_total / 1024 / 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_size_steps() {
        assert_eq!(base_swap_size(2), 2048);
        assert_eq!(base_swap_size(4), 4096);
        assert_eq!(base_swap_size(15), 4096);
        assert_eq!(base_swap_size(16), 8192);
        assert_eq!(base_swap_size(64), 16384);
    }

    #[test]
    fn overcommit_adds_a_share_of_ram() {
        assert_eq!(calculate_swap_size(32 * 1024, 0.5), 24576);
        assert_eq!(calculate_swap_size(8 * 1024, 0.0), 4096);
        assert_eq!(calculate_swap_size(1000, 0.25), 2048 + 250);
    }

    #[test]
    fn eight_gb_with_half_overcommit() {
        // 8GB sits in the 4..16 band, so the base is 4096 before overcommit.
        assert_eq!(calculate_swap_size(8 * 1024, 0.5), 4096 + 4096);
    }
}
