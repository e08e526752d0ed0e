//! Component J: Volume Facade.
//!
//! Ties every other component together: opens a device, decodes its boot
//! sector and allocation table, and exposes the top-level operations
//! (`label`, `root_directory`, identifier/path lookup). Grounded on the
//! teacher's `FileSystem`/`VirtFile` pair (`fs.rs`/`vfs.rs`): `Volume` plays
//! `FileSystem`'s role (owns the device, the allocation table, the cache),
//! `FileEntry` plays `VirFile`'s role (a handle borrowing its owning volume
//! plus its own read position), generalized across all four variants and
//! reduced to read-only operations.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicU8, Ordering};

use spin::RwLock as SpinRwLock;

use crate::abort::AbortFlag;
use crate::boot::{self, Geometry, Variant};
use crate::cache::{self, BlockCache};
use crate::device::BlockDevice;
use crate::dir::{self, Source};
use crate::dirent::{self, Attributes, FileEntry as RawEntry, Notify, Severity, ATTR_DIRECTORY, RECORD_SIZE};
use crate::error::{self, Result};
use crate::fat::{AllocationTable, LinkKind};
use crate::name;
use crate::path;
use crate::stream::{DataStream, Whence};
use crate::time::Timestamp;

/// Forwards to the `log` facade, the default sink described in SPEC_FULL's
/// "injected logger" ambient-stack section.
struct LogNotify;

impl Notify for LogNotify {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug => log::debug!("{message}"),
            Severity::Warning => log::warn!("{message}"),
        }
    }
}

const STATE_OPEN: u8 = 0;
const STATE_ABORTED: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Constructor-time knobs, the "small set of... knobs" SPEC_FULL calls out
/// in place of a config file.
pub struct OpenOptions {
    pub cache_capacity: usize,
    /// Build the optional reversed allocation-table index (§9 Open
    /// Question: allocated but never meaningfully consumed upstream; kept
    /// off by default here too).
    pub build_reverse_index: bool,
    pub notify: Option<Arc<dyn Notify>>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            cache_capacity: cache::DEFAULT_CAPACITY,
            build_reverse_index: false,
            notify: None,
        }
    }
}

/// An open FAT/exFAT volume. `{Uninit, Open, Aborted, Closed}` from the
/// spec's state machine collapses to `{Open, Aborted, Closed}`: Rust's
/// ownership model makes "uninitialized but in scope" a non-value — a
/// `Volume` simply doesn't exist until `open` succeeds, so there is nothing
/// for a separate `Uninit` state to guard (see DESIGN.md).
pub struct Volume<D> {
    geometry: Geometry,
    table: AllocationTable,
    cache: SpinRwLock<BlockCache<D>>,
    abort: AbortFlag,
    state: AtomicU8,
    notify: Arc<dyn Notify>,
}

impl<D: BlockDevice> Volume<D> {
    /// Decode the boot sector, load the allocation table, and return an
    /// open volume. No partial object is ever observable on failure: each
    /// step either produces a fully valid `Volume` or an `Error`, the
    /// scoped-acquisition replacement for the reference's `goto on_error`
    /// cleanup chains.
    pub fn open(device: D, options: OpenOptions) -> Result<Self> {
        let mut boot_sector = [0u8; 512];
        let n = device.read_at(0, &mut boot_sector)?;
        if (n as usize) < boot_sector.len() {
            return Err(error::io_read_failed("short read of boot sector"));
        }
        let geometry = boot::decode(&boot_sector)?;

        let table = AllocationTable::load(&device, &geometry, options.build_reverse_index)?;

        let device = Arc::new(device);
        let cache = BlockCache::new(
            device,
            geometry.bytes_per_sector as usize,
            options.cache_capacity,
        );

        Ok(Volume {
            geometry,
            table,
            cache: SpinRwLock::new(cache),
            abort: AbortFlag::new(),
            state: AtomicU8::new(STATE_OPEN),
            notify: options.notify.unwrap_or_else(|| Arc::new(LogNotify)),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.state.load(Ordering::SeqCst) == STATE_CLOSED {
            return Err(error::runtime_wrong_state("volume is closed"));
        }
        Ok(())
    }

    /// Set the cooperative abort flag. Every long-running loop (chain
    /// traversal, directory scan) polls it between iterations; the call in
    /// flight returns "abort requested" at its next suspension point, not
    /// immediately (testable property 9).
    pub fn signal_abort(&self) {
        self.abort.signal();
        self.state.store(STATE_ABORTED, Ordering::SeqCst);
    }

    /// Release the cache and allocation table. Further calls fail with
    /// `WrongState`.
    pub fn close(&self) {
        self.cache.write().clear();
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
    }

    pub fn file_system_format(&self) -> Variant {
        self.geometry.variant
    }

    fn root_source(&self) -> Source {
        match (
            self.geometry.root_directory_offset_bytes,
            self.geometry.root_directory_size_bytes,
        ) {
            (Some(offset), Some(size)) => Source::FixedRange { offset, size },
            _ => Source::Chain {
                start_cluster: self.geometry.root_directory_cluster.unwrap_or(0),
                no_fat_chain: false,
            },
        }
    }

    fn read_directory(&self, source: Source) -> Result<(Vec<RawEntry>, Option<String>)> {
        self.check_open()?;
        let mut cache = self.cache.write();
        dir::read_directory(
            &mut cache,
            &self.geometry,
            &self.table,
            source,
            Some(&self.abort),
            self.notify.as_ref(),
        )
    }

    /// The volume label: a FAT12/16/32 `BS_VolLab` boot-sector field takes
    /// precedence if non-blank (matching the reference's own preference for
    /// the root directory's `ATTR_VOLUME_LABEL` record when both exist —
    /// the directory record is authoritative since `BS_VolLab` is routinely
    /// stale after a relabel), falling back to the boot-sector field, then
    /// to the exFAT root directory's `0x83` entry.
    pub fn label_utf8(&self) -> Result<Option<String>> {
        let (_, dir_label) = self.read_directory(self.root_source())?;
        if dir_label.is_some() {
            return Ok(dir_label);
        }
        Ok(self
            .geometry
            .volume_label_raw
            .as_ref()
            .and_then(boot::decode_label))
    }

    /// The root directory, wrapped in the same [`FileEntry`] shape every
    /// other child uses.
    pub fn root_directory(&self) -> Result<FileEntry<'_, D>> {
        self.check_open()?;
        let raw = RawEntry {
            identifier: self.geometry.root_directory_cluster.unwrap_or(0) as u64,
            name: String::from("/"),
            short_name: None,
            attributes: Attributes(ATTR_DIRECTORY),
            access_time: None,
            creation_time: None,
            modification_time: None,
            size: 0,
            valid_data_length: None,
            start_cluster: self.geometry.root_directory_cluster.unwrap_or(0),
            no_fat_chain: false,
        };
        Ok(self.wrap(raw, Some(self.root_source())))
    }

    fn wrap(&self, raw: RawEntry, directory_source: Option<Source>) -> FileEntry<'_, D> {
        let stream = DataStream::new(raw.start_cluster, raw.size, raw.no_fat_chain);
        FileEntry {
            volume: self,
            raw,
            directory_source,
            stream: RefCell::new(stream),
        }
    }

    fn children_of(&self, source: Source) -> Result<Vec<FileEntry<'_, D>>> {
        let (children, _) = self.read_directory(source)?;
        Ok(children.into_iter().map(|raw| self.wrap(raw, None)).collect())
    }

    /// Resolve an identifier to a `FileEntry`.
    ///
    /// FAT12/16/32: per §4.J, the identifier is the start cluster, and its
    /// directory record is located directly at
    /// `fat_offset_bytes + (id - 2) * 32` without walking any directory —
    /// an address scheme inherited unchanged from the distilled spec (see
    /// DESIGN.md for why this reuses the *allocation table's* base offset
    /// rather than the data area's). exFAT's identifier is a virtual id
    /// with no addressable on-disk location, so it is resolved by walking
    /// the tree from the root instead.
    pub fn file_entry_by_identifier(&self, id: u64) -> Result<Option<FileEntry<'_, D>>> {
        self.check_open()?;
        if self.geometry.variant == Variant::ExFat {
            let root = self.root_directory()?;
            return self.find_by_identifier(root, id);
        }

        if id < 2 || id > u32::MAX as u64 {
            return Ok(None);
        }
        let cluster = id as u32;
        match self.table.link_kind(cluster) {
            Ok(LinkKind::Free) | Err(_) => return Ok(None),
            _ => {}
        }

        let offset = self.geometry.fat_offset_bytes + (id - 2) * 32;
        let mut record = [0u8; RECORD_SIZE];
        {
            let mut cache = self.cache.write();
            cache.read_range(offset, &mut record)?;
        }
        if record[0] == 0 || record[0] == dirent::DELETED_MARKER {
            return Ok(None);
        }
        if dirent::short_name_attr(&record) & 0x3F == dirent::ATTR_LFN {
            return Ok(None);
        }
        let raw = dirent::decode_short_entry(&record);
        Ok(Some(self.wrap(raw, None)))
    }

    fn find_by_identifier<'v>(
        &'v self,
        entry: FileEntry<'v, D>,
        id: u64,
    ) -> Result<Option<FileEntry<'v, D>>> {
        if entry.identifier() == id {
            return Ok(Some(entry));
        }
        if !entry.is_directory() {
            return Ok(None);
        }
        for child in entry.sub_entries()? {
            if let Some(found) = self.find_by_identifier(child, id)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Resolve a `/`- or `\`-separated path against the directory tree
    /// (component L), case-insensitively. A directory-read error
    /// encountered mid-resolution (e.g. a corrupt chain) surfaces as
    /// "not found" rather than propagating — [`path::resolve`]'s generic
    /// contract returns `Option`, not `Result` (see DESIGN.md).
    pub fn file_entry_by_utf8_path(&self, path_str: &str) -> Result<Option<FileEntry<'_, D>>> {
        let root = self.root_directory()?;
        Ok(path::resolve(
            &root,
            path_str,
            |entry| {
                if entry.is_directory() {
                    entry.sub_entries().ok()
                } else {
                    None
                }
            },
            |entry| entry.raw.name.clone(),
        ))
    }
}

/// A shared, lock-guarded volume, realizing the spec's "implementations MAY
/// place a volume behind a reader-writer lock to make API calls from
/// multiple threads safe". `Volume` itself stays single-threaded-shaped
/// (interior mutability only where the block cache genuinely needs it);
/// this newtype is the opt-in wrapper for callers that need one handle
/// shared across threads.
pub struct SharedVolume<D>(SpinRwLock<Volume<D>>);

impl<D: BlockDevice> SharedVolume<D> {
    pub fn new(volume: Volume<D>) -> Self {
        SharedVolume(SpinRwLock::new(volume))
    }

    pub fn read(&self) -> spin::RwLockReadGuard<'_, Volume<D>> {
        self.0.read()
    }

    pub fn write(&self) -> spin::RwLockWriteGuard<'_, Volume<D>> {
        self.0.write()
    }
}

/// The logical object the library hands out: a directory entry borrowed
/// from its owning [`Volume`], with its own independent read position.
/// Mirrors the teacher's `VirFile` (a handle holding `fs: Arc<RwLock<FileSystem>>`
/// plus its own `cluster_chain`), generalized to a borrow (`&'v Volume`)
/// since this crate never mutates a volume from multiple owners the way the
/// teacher's write path does.
#[derive(Clone)]
pub struct FileEntry<'v, D> {
    volume: &'v Volume<D>,
    raw: RawEntry,
    /// `Some` only for the root directory, whose record stream lives at a
    /// fixed range (FAT12/16) or a cluster chain with no on-disk directory
    /// record of its own (FAT32/exFAT) — there is no `raw` field this could
    /// be derived from the way an ordinary child's `Source::Chain` is
    /// derived from `start_cluster`/`no_fat_chain`.
    directory_source: Option<Source>,
    stream: RefCell<DataStream>,
}

impl<'v, D: BlockDevice> FileEntry<'v, D> {
    pub fn identifier(&self) -> u64 {
        self.raw.identifier
    }

    pub fn name_utf8(&self) -> &str {
        &self.raw.name
    }

    pub fn attributes(&self) -> Attributes {
        self.raw.attributes
    }

    pub fn access_time(&self) -> Option<Timestamp> {
        self.raw.access_time
    }

    pub fn creation_time(&self) -> Option<Timestamp> {
        self.raw.creation_time
    }

    pub fn modification_time(&self) -> Option<Timestamp> {
        self.raw.modification_time
    }

    pub fn size(&self) -> u64 {
        self.raw.size
    }

    pub fn valid_data_length(&self) -> Option<u64> {
        self.raw.valid_data_length
    }

    pub fn is_directory(&self) -> bool {
        self.raw.is_directory()
    }

    /// This entry's children, in on-disk order. Fails if called on a
    /// non-directory entry.
    pub fn sub_entries(&self) -> Result<Vec<FileEntry<'v, D>>> {
        if !self.is_directory() {
            return Err(error::arg_invalid("sub_entries called on a non-directory entry"));
        }
        let source = self.directory_source.unwrap_or(Source::Chain {
            start_cluster: self.raw.start_cluster,
            no_fat_chain: self.raw.no_fat_chain,
        });
        self.volume.children_of(source)
    }

    pub fn seek(&self, whence: Whence, offset: i64) -> Result<u64> {
        self.stream.borrow_mut().seek(whence, offset)
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut cache = self.volume.cache.write();
        self.stream.borrow_mut().read(
            &mut cache,
            &self.volume.geometry,
            &self.volume.table,
            Some(&self.volume.abort),
            buf,
        )
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut cache = self.volume.cache.write();
        self.stream.borrow_mut().read_at(
            &mut cache,
            &self.volume.geometry,
            &self.volume.table,
            Some(&self.volume.abort),
            offset,
            buf,
        )
    }

    pub fn extents(&self) -> Result<Vec<(u64, u64, u32)>> {
        self.stream.borrow_mut().extents(
            &self.volume.geometry,
            &self.volume.table,
            Some(&self.volume.abort),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;
    use alloc::vec;

    fn short_record(name: &[u8; 8], ext: &[u8; 3], attr: u8, size: u32) -> [u8; RECORD_SIZE] {
        let mut r = [0u8; RECORD_SIZE];
        r[0..8].copy_from_slice(name);
        r[8..11].copy_from_slice(ext);
        r[11] = attr;
        r[28..32].copy_from_slice(&size.to_le_bytes());
        r
    }

    /// Build a minimal FAT12 1.44MB-floppy-shaped image with a label, one
    /// zero-byte file, and one subdirectory containing an LFN-named file —
    /// spec scenario S1.
    fn fat12_image() -> Vec<u8> {
        let bytes_per_sector = 512usize;
        let reserved_sectors = 1usize;
        let num_fats = 2usize;
        let fat_size_sectors = 9usize;
        let root_entry_count = 224usize;
        let root_dir_sectors = (root_entry_count * 32).div_ceil(bytes_per_sector);
        let root_dir_offset = (reserved_sectors + num_fats * fat_size_sectors) * bytes_per_sector;
        let data_offset = root_dir_offset + root_dir_sectors * bytes_per_sector;
        let cluster_size = bytes_per_sector; // 1 sector/cluster

        let total_size = data_offset + cluster_size * 8;
        let mut image = vec![0u8; total_size];

        image[11..13].copy_from_slice(&(bytes_per_sector as u16).to_le_bytes());
        image[13] = 1;
        image[14..16].copy_from_slice(&(reserved_sectors as u16).to_le_bytes());
        image[16] = num_fats as u8;
        image[17..19].copy_from_slice(&(root_entry_count as u16).to_le_bytes());
        image[19..21].copy_from_slice(&2880u16.to_le_bytes());
        image[21] = 0xF0;
        image[22..24].copy_from_slice(&(fat_size_sectors as u16).to_le_bytes());
        image[43..54].copy_from_slice(b"TESTVOLUME ");
        image[510] = 0x55;
        image[511] = 0xAA;

        // FAT entries: cluster 2 is TESTDIR1's only cluster, marked EOC.
        // FAT12 packs entry N at byte_index = (N*3)/2; for N=2 that's bytes
        // [3,4], with the low nibble of byte 4 completing the 12 bits.
        let fat_offset = reserved_sectors * bytes_per_sector;
        image[fat_offset + 3] = 0xFF;
        image[fat_offset + 4] = 0x0F; // entry2 = 0xFFF (EOC)

        // Root directory: label, EMPTYFILE (0 bytes), TESTDIR1 (directory,
        // cluster 2).
        let label = short_record(b"TESTVOLU", b"ME ", crate::dirent::ATTR_VOLUME_LABEL as u8, 0);
        let empty_file = short_record(b"EMPTYFIL", b"E  ", 0x20, 0);
        let mut testdir1 = short_record(b"TESTDIR1", b"   ", crate::dirent::ATTR_DIRECTORY as u8, 0);
        testdir1[26..28].copy_from_slice(&2u16.to_le_bytes()); // fst_clus_lo = 2

        image[root_dir_offset..root_dir_offset + RECORD_SIZE].copy_from_slice(&label);
        image[root_dir_offset + RECORD_SIZE..root_dir_offset + 2 * RECORD_SIZE]
            .copy_from_slice(&empty_file);
        image[root_dir_offset + 2 * RECORD_SIZE..root_dir_offset + 3 * RECORD_SIZE]
            .copy_from_slice(&testdir1);

        // TESTDIR1's own cluster (cluster 2, at data_offset): `.`, `..`,
        // then an LFN run + short name for "My long, very long file name".
        let dir_cluster_offset = data_offset; // (2 - 2) * cluster_size
        let dot = short_record(b".       ", b"   ", crate::dirent::ATTR_DIRECTORY as u8, 0);
        let dotdot = short_record(b"..      ", b"   ", crate::dirent::ATTR_DIRECTORY as u8, 0);
        image[dir_cluster_offset..dir_cluster_offset + RECORD_SIZE].copy_from_slice(&dot);
        image[dir_cluster_offset + RECORD_SIZE..dir_cluster_offset + 2 * RECORD_SIZE]
            .copy_from_slice(&dotdot);

        let short = short_record(b"MYLONG~1", b"   ", 0x20, 0);
        let field = {
            let mut f = [0u8; 11];
            f.copy_from_slice(&short[0..11]);
            f
        };
        let checksum = name::lfn_checksum(&field);
        let full = "My long, very long file name";
        let units: Vec<u16> = full.encode_utf16().collect();
        let mut rec2 = [0u8; RECORD_SIZE];
        rec2[0] = 2 | 0x40;
        rec2[11] = crate::dirent::ATTR_LFN as u8;
        rec2[13] = checksum;
        let mut rec1 = [0u8; RECORD_SIZE];
        rec1[0] = 1;
        rec1[11] = crate::dirent::ATTR_LFN as u8;
        rec1[13] = checksum;

        fn fill_lfn(r: &mut [u8; RECORD_SIZE], units: &[u16]) {
            let mut padded = units.to_vec();
            if padded.len() < 13 {
                padded.push(0);
            }
            while padded.len() < 13 {
                padded.push(0xFFFF);
            }
            for i in 0..5 {
                r[1 + i * 2..3 + i * 2].copy_from_slice(&padded[i].to_le_bytes());
            }
            for i in 0..6 {
                r[14 + i * 2..16 + i * 2].copy_from_slice(&padded[5 + i].to_le_bytes());
            }
            for i in 0..2 {
                r[28 + i * 2..30 + i * 2].copy_from_slice(&padded[11 + i].to_le_bytes());
            }
        }
        fill_lfn(&mut rec1, &units[0..13]);
        fill_lfn(&mut rec2, &units[13..]);

        image[dir_cluster_offset + 2 * RECORD_SIZE..dir_cluster_offset + 3 * RECORD_SIZE]
            .copy_from_slice(&rec2);
        image[dir_cluster_offset + 3 * RECORD_SIZE..dir_cluster_offset + 4 * RECORD_SIZE]
            .copy_from_slice(&rec1);
        image[dir_cluster_offset + 4 * RECORD_SIZE..dir_cluster_offset + 5 * RECORD_SIZE]
            .copy_from_slice(&short);

        image
    }

    #[test]
    fn s1_fat12_floppy_end_to_end() {
        let device = MemoryDevice::new(fat12_image());
        let volume = Volume::open(device, OpenOptions::default()).unwrap();
        assert_eq!(volume.file_system_format(), Variant::Fat12);
        assert_eq!(volume.label_utf8().unwrap().as_deref(), Some("TESTVOLUME"));

        let root = volume.root_directory().unwrap();
        let children = root.sub_entries().unwrap();
        assert_eq!(children.len(), 2, "label is excluded from the listing");

        let found = volume
            .file_entry_by_utf8_path("/TESTDIR1/My long, very long file name")
            .unwrap();
        assert!(found.is_some());
        let entry = found.unwrap();
        assert_eq!(entry.size(), 0);
        let mut buf = [0u8; 4];
        assert_eq!(entry.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn case_insensitive_path_resolution_agrees() {
        let device = MemoryDevice::new(fat12_image());
        let volume = Volume::open(device, OpenOptions::default()).unwrap();
        let upper = volume.file_entry_by_utf8_path("/TESTDIR1").unwrap();
        let lower = volume.file_entry_by_utf8_path("/testdir1").unwrap();
        assert_eq!(upper.unwrap().identifier(), lower.unwrap().identifier());
    }

    #[test]
    fn signal_abort_is_observed_by_next_call() {
        // The root directory on FAT12 is a fixed byte range, read without
        // ever consulting the abort flag; a cluster-chain walk is needed to
        // observe it, so resolve into the subdirectory first.
        let device = MemoryDevice::new(fat12_image());
        let volume = Volume::open(device, OpenOptions::default()).unwrap();
        let root = volume.root_directory().unwrap();
        let children = root.sub_entries().unwrap();
        let testdir = children
            .into_iter()
            .find(|c| c.name_utf8() == "TESTDIR1")
            .unwrap();

        volume.signal_abort();
        let err = testdir.sub_entries().unwrap_err();
        assert_eq!(err.code(), crate::error::Code::AbortRequested);
    }

    #[test]
    fn closed_volume_rejects_further_calls() {
        let device = MemoryDevice::new(fat12_image());
        let volume = Volume::open(device, OpenOptions::default()).unwrap();
        volume.close();
        assert!(volume.root_directory().is_err());
    }
}
