//! Component E: Cluster-Chain Iterator.
//!
//! Walks a chain start→EOC, producing `(device_offset, length)` runs.
//! Grounded on the teacher's `ClusterChain` (`fat.rs`), generalized from a
//! hardcoded FAT32 4-byte walk to dispatch on [`crate::boot::Variant`] via
//! the allocation table, and extended with the exFAT "no FAT chain" fast
//! path described in jmesmon-exfat-rs's layout notes (a contiguous run
//! needs no table lookups at all).

use alloc::vec::Vec;

use crate::abort::AbortFlag;
use crate::boot::Geometry;
use crate::error::{self, Result};
use crate::fat::{classify_value, AllocationTable, LinkKind};

/// One physical extent of a chain: a run of bytes on the block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub device_offset: u64,
    pub length: u64,
}

/// Whether a chain is a normal linked list of clusters, or (exFAT only,
/// when the stream extension's "no FAT chain" bit is set) a contiguous run
/// whose length is derived purely from the data size.
#[derive(Debug, Clone, Copy)]
pub enum ChainMode {
    Linked,
    Contiguous { cluster_count: u64 },
}

/// Walk a chain starting at `start_cluster`, returning its runs in order.
///
/// `start_cluster == 0` or a cluster already in the EOC range yields an
/// empty chain (directories/files with no allocated clusters, e.g. a
/// zero-byte file). The iteration is bounded by `geometry`'s cluster count
/// to defeat cycles, matching testable property 1.
pub fn resolve(
    geometry: &Geometry,
    table: &AllocationTable,
    start_cluster: u32,
    mode: ChainMode,
    abort: Option<&AbortFlag>,
) -> Result<Vec<Run>> {
    match mode {
        ChainMode::Contiguous { cluster_count } => {
            if start_cluster == 0 || cluster_count == 0 {
                return Ok(Vec::new());
            }
            Ok(alloc::vec![Run {
                device_offset: geometry.cluster_offset(start_cluster),
                length: cluster_count * geometry.cluster_size,
            }])
        }
        ChainMode::Linked => resolve_linked(geometry, table, start_cluster, abort),
    }
}

fn resolve_linked(
    geometry: &Geometry,
    table: &AllocationTable,
    start_cluster: u32,
    abort: Option<&AbortFlag>,
) -> Result<Vec<Run>> {
    if start_cluster == 0
        || matches!(
            classify_value(table.variant(), start_cluster),
            LinkKind::EndOfChain
        )
    {
        return Ok(Vec::new());
    }

    let guard = table.entry_count().saturating_sub(2).max(1);
    let mut runs = Vec::new();
    let mut current = start_cluster;
    let mut steps: u32 = 0;

    loop {
        if let Some(flag) = abort {
            flag.check()?;
        }
        steps += 1;
        if steps > guard {
            return Err(error::input_corruption(
                "cluster chain exceeded cluster_count iterations",
            ));
        }

        runs.push(Run {
            device_offset: geometry.cluster_offset(current),
            length: geometry.cluster_size,
        });

        match table.link_kind(current)? {
            LinkKind::Next(next) => current = next,
            LinkKind::EndOfChain => break,
            LinkKind::Bad | LinkKind::Reserved | LinkKind::Free => {
                return Err(error::input_corruption(alloc::format!(
                    "chain terminated on non-EOC special value at cluster {current}"
                )));
            }
        }
    }

    Ok(runs)
}

/// Merge adjacent runs whose device offsets are contiguous, for
/// `FileEntry::extents()` (spec: "consecutive clusters with contiguous
/// device offsets MAY be coalesced").
pub fn coalesce(runs: &[Run]) -> Vec<Run> {
    let mut out: Vec<Run> = Vec::new();
    for run in runs {
        if let Some(last) = out.last_mut() {
            if last.device_offset + last.length == run.device_offset {
                last.length += run.length;
                continue;
            }
        }
        out.push(*run);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::Variant;
    use crate::device::MemoryDevice;

    fn geometry(cluster_count: u32, cluster_size: u64) -> Geometry {
        Geometry {
            variant: Variant::Fat16,
            bytes_per_sector: 512,
            sectors_per_cluster: (cluster_size / 512) as u32,
            cluster_size,
            num_fats: 1,
            fat_offset_bytes: 0,
            fat_size_bytes: (cluster_count as u64 + 2) * 2,
            cluster_count,
            first_data_cluster_offset_bytes: 1_000_000,
            root_directory_offset_bytes: None,
            root_directory_size_bytes: None,
            root_directory_cluster: None,
            volume_serial_number: 0,
            volume_label_raw: None,
        }
    }

    fn fat16_bytes(entries: &[u16]) -> Vec<u8> {
        entries.iter().flat_map(|e| e.to_le_bytes()).collect()
    }

    #[test]
    fn empty_chain_for_zero_start() {
        let geo = geometry(4, 512);
        let raw = fat16_bytes(&[0xFFF8, 0xFFFF, 0, 0, 0, 0]);
        let dev = MemoryDevice::new(raw);
        let table = AllocationTable::load(&dev, &geo, false).unwrap();
        let runs = resolve(&geo, &table, 0, ChainMode::Linked, None).unwrap();
        assert!(runs.is_empty());
    }

    #[test]
    fn linked_chain_walks_to_eoc() {
        let geo = geometry(4, 512);
        let raw = fat16_bytes(&[0xFFF8, 0xFFFF, 3, 4, 0xFFFF, 0]);
        let dev = MemoryDevice::new(raw);
        let table = AllocationTable::load(&dev, &geo, false).unwrap();
        let runs = resolve(&geo, &table, 2, ChainMode::Linked, None).unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].device_offset, geo.cluster_offset(2));
        assert_eq!(runs[2].device_offset, geo.cluster_offset(4));
    }

    #[test]
    fn cycle_is_rejected() {
        let geo = geometry(3, 512);
        // cluster 2 -> 3 -> 2 (cycle)
        let raw = fat16_bytes(&[0xFFF8, 0xFFFF, 3, 2, 0]);
        let dev = MemoryDevice::new(raw);
        let table = AllocationTable::load(&dev, &geo, false).unwrap();
        let err = resolve(&geo, &table, 2, ChainMode::Linked, None).unwrap_err();
        assert_eq!(err.code(), crate::error::Code::Corruption);
    }

    #[test]
    fn contiguous_mode_skips_table() {
        let geo = geometry(4, 512);
        let raw = fat16_bytes(&[0xFFF8, 0xFFFF]);
        let dev = MemoryDevice::new(raw);
        let table = AllocationTable::load(&dev, &geo, false).unwrap();
        let runs = resolve(
            &geo,
            &table,
            2,
            ChainMode::Contiguous { cluster_count: 3 },
            None,
        )
        .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].length, 3 * 512);
    }

    #[test]
    fn coalesce_merges_adjacent_runs() {
        let runs = alloc::vec![
            Run { device_offset: 0, length: 512 },
            Run { device_offset: 512, length: 512 },
            Run { device_offset: 2048, length: 512 },
        ];
        let merged = coalesce(&runs);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].length, 1024);
    }
}
