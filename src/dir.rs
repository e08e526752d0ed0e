//! Component G: Directory Reader.
//!
//! Reads a directory's raw 32-byte record stream — either a FAT12/16 fixed
//! byte range or a FAT32/exFAT cluster chain — and hands it to
//! [`crate::dirent`] for decoding. Grounded on the teacher's `dir.rs`
//! (`ls_with_attr`/`find_by_lfn`) for the FAT12/16/32 traversal and on
//! `vfs.rs`'s `root()` for the chain-walk-to-build-a-byte-stream pattern,
//! generalized to also cover exFAT and the fixed-range root case the
//! teacher's FAT32-only code never needed.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::abort::AbortFlag;
use crate::boot::{Geometry, Variant};
use crate::cache::BlockCache;
use crate::chain::{self, ChainMode};
use crate::device::BlockDevice;
use crate::dirent::{self, FileEntry, Notify, RECORD_SIZE};
use crate::error::Result;
use crate::fat::AllocationTable;

/// Where a directory's record stream lives on disk.
#[derive(Debug, Clone, Copy)]
pub enum Source {
    /// FAT12/16 root directory: a fixed contiguous byte range, not backed by
    /// any cluster chain.
    FixedRange { offset: u64, size: u64 },
    /// FAT32/exFAT root, or any subdirectory: a cluster chain. `no_fat_chain`
    /// is always `false` outside exFAT.
    Chain { start_cluster: u32, no_fat_chain: bool },
}

fn read_records<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    geometry: &Geometry,
    table: &AllocationTable,
    source: Source,
    abort: Option<&AbortFlag>,
) -> Result<Vec<[u8; RECORD_SIZE]>> {
    let runs = match source {
        Source::FixedRange { offset, size } => {
            alloc::vec![chain::Run { device_offset: offset, length: size }]
        }
        Source::Chain { start_cluster, no_fat_chain } => {
            // Directories are always FAT-chain allocated in exFAT in
            // practice; `no_fat_chain` is threaded through for symmetry with
            // `stream.rs` but degenerates to a single cluster if a caller
            // ever forces it, since a directory carries no stream
            // extension's DataLength to derive a cluster count from.
            let mode = if no_fat_chain {
                ChainMode::Contiguous { cluster_count: 1 }
            } else {
                ChainMode::Linked
            };
            chain::resolve(geometry, table, start_cluster, mode, abort)?
        }
    };

    let mut raw = Vec::new();
    for run in &runs {
        let mut buf = vec![0u8; run.length as usize];
        cache.read_range(run.device_offset, &mut buf)?;
        raw.extend_from_slice(&buf);
    }

    let record_count = raw.len() / RECORD_SIZE;
    let mut records = Vec::with_capacity(record_count);
    for i in 0..record_count {
        let mut record = [0u8; RECORD_SIZE];
        record.copy_from_slice(&raw[i * RECORD_SIZE..(i + 1) * RECORD_SIZE]);
        records.push(record);
    }
    Ok(records)
}

/// Read and decode one directory's children.
///
/// Returns `(children, volume_label)`. `volume_label` is `Some` for a
/// FAT12/16/32 root directory carrying an `ATTR_VOLUME_LABEL` record, or an
/// exFAT root directory carrying a `0x83` Volume Label entry; `None` for any
/// other directory.
pub fn read_directory<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    geometry: &Geometry,
    table: &AllocationTable,
    source: Source,
    abort: Option<&AbortFlag>,
    notify: &dyn Notify,
) -> Result<(Vec<FileEntry>, Option<String>)> {
    let records = read_records(cache, geometry, table, source, abort)?;
    if geometry.variant == Variant::ExFat {
        dirent::decode_exfat_stream(&records, notify)
    } else {
        dirent::decode_fat_stream(&records, notify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;
    use alloc::sync::Arc;

    struct NullNotify;
    impl Notify for NullNotify {
        fn notify(&self, _severity: dirent::Severity, _message: &str) {}
    }

    fn short_record(name: &[u8; 8], ext: &[u8; 3], attr: u8) -> [u8; RECORD_SIZE] {
        let mut r = [0u8; RECORD_SIZE];
        r[0..8].copy_from_slice(name);
        r[8..11].copy_from_slice(ext);
        r[11] = attr;
        r
    }

    fn geometry_fixed_root(root_offset: u64, root_size: u64) -> Geometry {
        Geometry {
            variant: Variant::Fat16,
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            cluster_size: 512,
            num_fats: 1,
            fat_offset_bytes: 0,
            fat_size_bytes: 512,
            cluster_count: 10,
            first_data_cluster_offset_bytes: root_offset + root_size,
            root_directory_offset_bytes: Some(root_offset),
            root_directory_size_bytes: Some(root_size),
            root_directory_cluster: None,
            volume_serial_number: 0,
            volume_label_raw: None,
        }
    }

    #[test]
    fn reads_fixed_range_root_directory() {
        let mut image = vec![0u8; 1024 + 2 * 512];
        let rec = short_record(b"HELLO   ", b"TXT", 0x20);
        image[1024..1024 + RECORD_SIZE].copy_from_slice(&rec);

        let geometry = geometry_fixed_root(1024, 1024);
        let device = Arc::new(MemoryDevice::new(image));
        let fat_raw = vec![0u8; geometry.fat_size_bytes as usize];
        let fat_device = MemoryDevice::new(fat_raw);
        let table = AllocationTable::load(&fat_device, &geometry, false).unwrap();

        let mut cache = BlockCache::new(device, 512, 8);
        let notify = NullNotify;
        let (children, label) = read_directory(
            &mut cache,
            &geometry,
            &table,
            Source::FixedRange { offset: 1024, size: 1024 },
            None,
            &notify,
        )
        .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "HELLO.TXT");
        assert!(label.is_none());
    }

    #[test]
    fn volume_label_record_is_reported_separately_from_children() {
        let mut image = vec![0u8; 1024 + 512];
        let label_rec = short_record(b"MYDISK  ", b"   ", ATTR_VOLUME_LABEL_TEST);
        let file_rec = short_record(b"FILE    ", b"TXT", 0x20);
        image[1024..1024 + RECORD_SIZE].copy_from_slice(&label_rec);
        image[1024 + RECORD_SIZE..1024 + 2 * RECORD_SIZE].copy_from_slice(&file_rec);

        let geometry = geometry_fixed_root(1024, 512);
        let device = Arc::new(MemoryDevice::new(image));
        let fat_raw = vec![0u8; geometry.fat_size_bytes as usize];
        let fat_device = MemoryDevice::new(fat_raw);
        let table = AllocationTable::load(&fat_device, &geometry, false).unwrap();

        let mut cache = BlockCache::new(device, 512, 8);
        let notify = NullNotify;
        let (children, label) = read_directory(
            &mut cache,
            &geometry,
            &table,
            Source::FixedRange { offset: 1024, size: 512 },
            None,
            &notify,
        )
        .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "FILE.TXT");
        assert_eq!(label.as_deref(), Some("MYDISK"));
    }

    const ATTR_VOLUME_LABEL_TEST: u8 = 0x08;
}
