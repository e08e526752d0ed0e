//! Component H: File-Entry Data Stream.
//!
//! Maps logical byte offsets within one file entry's data to physical
//! device offsets via the cluster chain, and enforces the entry's declared
//! size. Grounded on the teacher's `VirtFile::read`/`read_at`/
//! `offset_block_pos` (`file.rs`/`vfs.rs`), generalized from a
//! single-cluster-chain-type FAT32 walk to dispatch through
//! [`crate::chain::resolve`] so the same code serves FAT12/16/32 and
//! exFAT's no-FAT-chain fast path.

use alloc::vec::Vec;

use crate::abort::AbortFlag;
use crate::boot::Geometry;
use crate::cache::BlockCache;
use crate::chain::{self, ChainMode, Run};
use crate::device::BlockDevice;
use crate::error::{self, Result};
use crate::fat::AllocationTable;

/// `seek` origin, matching the conventional SET/CUR/END trio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// A byte-addressable view over one file entry's clusters.
///
/// Owns only the logical state (current position, the lazily-built run
/// list); the block device, cache, geometry and allocation table it reads
/// through all belong to the `Volume` and are passed in per call, since a
/// `Volume` may have many open streams sharing one cache.
#[derive(Clone)]
pub struct DataStream {
    start_cluster: u32,
    size: u64,
    no_fat_chain: bool,
    current_offset: u64,
    runs: Option<Vec<Run>>,
}

impl DataStream {
    pub fn new(start_cluster: u32, size: u64, no_fat_chain: bool) -> Self {
        DataStream {
            start_cluster,
            size,
            no_fat_chain,
            current_offset: 0,
            runs: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn position(&self) -> u64 {
        self.current_offset
    }

    pub fn seek(&mut self, whence: Whence, offset: i64) -> Result<u64> {
        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => self.current_offset as i64,
            Whence::End => self.size as i64,
        };
        let new_offset = base
            .checked_add(offset)
            .ok_or_else(|| error::arg_out_of_bounds("seek overflow"))?;
        if new_offset < 0 {
            return Err(error::arg_out_of_bounds("seek to negative offset"));
        }
        self.current_offset = new_offset as u64;
        Ok(self.current_offset)
    }

    fn ensure_runs(
        &mut self,
        geometry: &Geometry,
        table: &AllocationTable,
        abort: Option<&AbortFlag>,
    ) -> Result<&[Run]> {
        if self.runs.is_none() {
            let mode = if self.no_fat_chain {
                let cluster_count = self.size.div_ceil(geometry.cluster_size);
                ChainMode::Contiguous { cluster_count }
            } else {
                ChainMode::Linked
            };
            let runs = chain::resolve(geometry, table, self.start_cluster, mode, abort)?;
            self.runs = Some(runs);
        }
        Ok(self.runs.as_deref().unwrap())
    }

    /// Copy `out.len()` bytes from `offset` (clamped to `size`) without
    /// mutating `current_offset`. Returns the number of bytes actually
    /// copied: fewer than `out.len()` only when `offset + out.len() > size`.
    pub fn read_at<D: BlockDevice>(
        &mut self,
        cache: &mut BlockCache<D>,
        geometry: &Geometry,
        table: &AllocationTable,
        abort: Option<&AbortFlag>,
        offset: u64,
        out: &mut [u8],
    ) -> Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let available = (self.size - offset).min(out.len() as u64) as usize;
        let to_read = &mut out[..available];

        self.ensure_runs(geometry, table, abort)?;
        let runs = self.runs.as_deref().unwrap();

        let mut remaining = to_read;
        let mut logical = offset;
        let mut run_base: u64 = 0;

        for run in runs {
            if remaining.is_empty() {
                break;
            }
            let run_end = run_base + run.length;
            if logical < run_end {
                let in_run_offset = logical - run_base;
                let chunk_len = (run.length - in_run_offset).min(remaining.len() as u64) as usize;
                let (chunk, rest) = remaining.split_at_mut(chunk_len);
                cache.read_range(run.device_offset + in_run_offset, chunk)?;
                remaining = rest;
                logical += chunk_len as u64;
            }
            run_base = run_end;
        }

        if !remaining.is_empty() {
            return Err(error::input_corruption(
                "cluster chain shorter than entry's declared size",
            ));
        }

        Ok(available)
    }

    /// Read from `current_offset`, advancing it by the number of bytes
    /// actually read.
    pub fn read<D: BlockDevice>(
        &mut self,
        cache: &mut BlockCache<D>,
        geometry: &Geometry,
        table: &AllocationTable,
        abort: Option<&AbortFlag>,
        buf: &mut [u8],
    ) -> Result<usize> {
        let offset = self.current_offset;
        let n = self.read_at(cache, geometry, table, abort, offset, buf)?;
        self.current_offset += n as u64;
        Ok(n)
    }

    /// The physical extents backing this stream, coalescing adjacent runs
    /// and clamping their total length to `size`: the last cluster of a
    /// chain is usually only partially occupied by file data, and the
    /// reported extents must reflect the entry's declared size, not the
    /// cluster-rounded allocation. `flags` is reserved (always 0) — no
    /// sparse/compressed extent kinds exist in FAT/exFAT.
    pub fn extents(
        &mut self,
        geometry: &Geometry,
        table: &AllocationTable,
        abort: Option<&AbortFlag>,
    ) -> Result<Vec<(u64, u64, u32)>> {
        self.ensure_runs(geometry, table, abort)?;
        let coalesced = chain::coalesce(self.runs.as_deref().unwrap());
        let mut remaining = self.size;
        let mut out = Vec::with_capacity(coalesced.len());
        for run in coalesced {
            if remaining == 0 {
                break;
            }
            let length = run.length.min(remaining);
            out.push((run.device_offset, length, 0u32));
            remaining -= length;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::Variant;
    use crate::device::MemoryDevice;
    use alloc::sync::Arc;
    use alloc::vec;

    fn geometry(cluster_count: u32, cluster_size: u64, first_data_offset: u64) -> Geometry {
        Geometry {
            variant: Variant::Fat16,
            bytes_per_sector: 512,
            sectors_per_cluster: (cluster_size / 512) as u32,
            cluster_size,
            num_fats: 1,
            fat_offset_bytes: 0,
            fat_size_bytes: (cluster_count as u64 + 2) * 2,
            cluster_count,
            first_data_cluster_offset_bytes: first_data_offset,
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
    fn read_at_spans_multiple_clusters() {
        let geo = geometry(4, 16, 1000);
        let fat_raw = fat16_bytes(&[0xFFF8, 0xFFFF, 3, 4, 0xFFFF, 0]);
        let fat_dev = MemoryDevice::new(fat_raw);
        let table = AllocationTable::load(&fat_dev, &geo, false).unwrap();

        let mut data = vec![0u8; 2000];
        for (i, cluster) in [2u32, 3, 4].iter().enumerate() {
            let off = geo.cluster_offset(*cluster) as usize;
            for j in 0..16 {
                data[off + j] = (i * 16 + j) as u8;
            }
        }
        let dev = Arc::new(MemoryDevice::new(data));
        let mut cache = BlockCache::new(dev, 16, 8);

        let mut stream = DataStream::new(2, 48, false);
        let mut buf = [0u8; 48];
        let n = stream
            .read_at(&mut cache, &geo, &table, None, 0, &mut buf)
            .unwrap();
        assert_eq!(n, 48);
        let expected: Vec<u8> = (0..48u32).map(|i| i as u8).collect();
        assert_eq!(&buf[..], expected.as_slice());
    }

    #[test]
    fn read_at_clamps_to_size() {
        let geo = geometry(2, 16, 1000);
        let fat_raw = fat16_bytes(&[0xFFF8, 0xFFFF, 0xFFFF]);
        let fat_dev = MemoryDevice::new(fat_raw);
        let table = AllocationTable::load(&fat_dev, &geo, false).unwrap();
        let dev = Arc::new(MemoryDevice::zeroed(2000));
        let mut cache = BlockCache::new(dev, 16, 8);

        let mut stream = DataStream::new(2, 10, false);
        let mut buf = [0xAAu8; 16];
        let n = stream
            .read_at(&mut cache, &geo, &table, None, 4, &mut buf)
            .unwrap();
        assert_eq!(n, 6);
    }

    #[test]
    fn seek_end_then_read_returns_zero() {
        let geo = geometry(2, 16, 1000);
        let fat_raw = fat16_bytes(&[0xFFF8, 0xFFFF, 0xFFFF]);
        let fat_dev = MemoryDevice::new(fat_raw);
        let table = AllocationTable::load(&fat_dev, &geo, false).unwrap();
        let dev = Arc::new(MemoryDevice::zeroed(2000));
        let mut cache = BlockCache::new(dev, 16, 8);

        let mut stream = DataStream::new(2, 10, false);
        let pos = stream.seek(Whence::End, 0).unwrap();
        assert_eq!(pos, 10);
        let mut buf = [0u8; 4];
        let n = stream
            .read(&mut cache, &geo, &table, None, &mut buf)
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn exfat_no_fat_chain_extent_is_single_contiguous_run() {
        let geo = geometry(8, 16, 1000);
        let fat_raw = vec![0u8; geo.fat_size_bytes as usize];
        let fat_dev = MemoryDevice::new(fat_raw);
        let table = AllocationTable::load(&fat_dev, &geo, false).unwrap();

        let mut stream = DataStream::new(2, 16 * 5 + 1, true);
        let extents = stream.extents(&geo, &table, None).unwrap();
        assert_eq!(extents.len(), 1);
        assert_eq!(extents[0].1, 16 * 5 + 1, "extent length must match declared size, not the cluster-rounded allocation");
    }

    #[test]
    fn extents_clamp_final_linked_cluster_to_size() {
        let geo = geometry(4, 16, 1000);
        let fat_raw = fat16_bytes(&[0xFFF8, 0xFFFF, 3, 0xFFFF, 0]);
        let fat_dev = MemoryDevice::new(fat_raw);
        let table = AllocationTable::load(&fat_dev, &geo, false).unwrap();

        // Two 16-byte clusters allocated, but only 20 bytes of file data.
        let mut stream = DataStream::new(2, 20, false);
        let extents = stream.extents(&geo, &table, None).unwrap();
        assert_eq!(extents.len(), 1);
        assert_eq!(extents[0].1, 20);
    }
}
