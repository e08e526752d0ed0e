//! Component F: Directory-Entry Decoder.
//!
//! Two independent sub-decoders share this module: one for FAT12/16/32's
//! 8.3 + VFAT LFN record stream, one for exFAT's 0x85/0xC0/0xC1 entry sets.
//! Both emit the same logical [`FileEntry`]. Grounded on the teacher's
//! `ShortDirEntry`/`LongDirEntry` (`entry.rs`) for the FAT12/16/32 layout
//! and byte offsets, and on jmesmon-exfat-rs's `DirEntry` for the exFAT
//! layout the teacher has no equivalent of.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::Result;
use crate::name;
use crate::time::Timestamp;

pub const RECORD_SIZE: usize = 32;

pub const ATTR_READ_ONLY: u16 = 0x01;
pub const ATTR_HIDDEN: u16 = 0x02;
pub const ATTR_SYSTEM: u16 = 0x04;
pub const ATTR_VOLUME_LABEL: u16 = 0x08;
pub const ATTR_DIRECTORY: u16 = 0x10;
pub const ATTR_ARCHIVE: u16 = 0x20;
pub const ATTR_DEVICE: u16 = 0x40;
pub const ATTR_LFN: u16 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_LABEL;

const LAST_LONG_ENTRY: u8 = 0x40;
pub(crate) const DELETED_MARKER: u8 = 0xE5;
const ESCAPED_E5: u8 = 0x05;

/// Attribute bitmask shared by both sub-decoders (exFAT's `FileAttributes`
/// field reuses the same bit positions as the FAT 8-bit attribute byte,
/// widened to 16 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes(pub u16);

impl Attributes {
    pub fn is_read_only(&self) -> bool {
        self.0 & ATTR_READ_ONLY != 0
    }
    pub fn is_hidden(&self) -> bool {
        self.0 & ATTR_HIDDEN != 0
    }
    pub fn is_system(&self) -> bool {
        self.0 & ATTR_SYSTEM != 0
    }
    pub fn is_volume_label(&self) -> bool {
        self.0 & ATTR_VOLUME_LABEL != 0
    }
    pub fn is_directory(&self) -> bool {
        self.0 & ATTR_DIRECTORY != 0
    }
    pub fn is_archive(&self) -> bool {
        self.0 & ATTR_ARCHIVE != 0
    }
    pub fn is_lfn(&self) -> bool {
        self.0 & 0x3F == ATTR_LFN
    }
}

/// The logical object the library hands out: a fully decoded child of a
/// directory, or the root itself.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub identifier: u64,
    pub name: String,
    pub short_name: Option<String>,
    pub attributes: Attributes,
    pub access_time: Option<Timestamp>,
    pub creation_time: Option<Timestamp>,
    pub modification_time: Option<Timestamp>,
    pub size: u64,
    /// exFAT only: the portion of `size` that has been written; bytes past
    /// this are logically zero.
    pub valid_data_length: Option<u64>,
    pub start_cluster: u32,
    /// exFAT only: stream extension's "no FAT chain" flag (contiguous
    /// allocation, no table lookups needed to walk it).
    pub no_fat_chain: bool,
}

impl FileEntry {
    pub fn is_directory(&self) -> bool {
        self.attributes.is_directory()
    }
}

/// Severity for the notify sink, matching the reference library's verbose
/// trace levels closely enough to be useful without pulling in its full
/// message catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Warning,
}

/// Injected logger for non-fatal anomalies and verbose traces. Default
/// implementation in `volume` forwards to the `log` crate; tests use a
/// `Vec`-collecting sink instead.
pub trait Notify {
    fn notify(&self, severity: Severity, message: &str);
}

fn read_u16(b: &[u8], o: usize) -> u16 {
    u16::from_le_bytes([b[o], b[o + 1]])
}
fn read_u32(b: &[u8], o: usize) -> u32 {
    u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}
fn read_u64(b: &[u8], o: usize) -> u64 {
    let mut a = [0u8; 8];
    a.copy_from_slice(&b[o..o + 8]);
    u64::from_le_bytes(a)
}

// ---------------------------------------------------------------------
// FAT12/16/32 sub-decoder
// ---------------------------------------------------------------------

fn is_all_zero(record: &[u8]) -> bool {
    record.iter().all(|&b| b == 0)
}

pub(crate) fn short_name_attr(record: &[u8]) -> u16 {
    record[11] as u16
}

fn lfn_fragment_units(record: &[u8]) -> [u16; 13] {
    let mut units = [0u16; 13];
    for i in 0..5 {
        units[i] = read_u16(record, 1 + i * 2);
    }
    for i in 0..6 {
        units[5 + i] = read_u16(record, 14 + i * 2);
    }
    for i in 0..2 {
        units[11 + i] = read_u16(record, 28 + i * 2);
    }
    units
}

fn short_name_83_field(record: &[u8]) -> [u8; 11] {
    let mut field = [0u8; 11];
    field.copy_from_slice(&record[0..11]);
    if field[0] == ESCAPED_E5 {
        field[0] = DELETED_MARKER;
    }
    field
}

fn short_name_display(record: &[u8]) -> (String, String) {
    let mut name_bytes = [0u8; 8];
    name_bytes.copy_from_slice(&record[0..8]);
    if name_bytes[0] == ESCAPED_E5 {
        name_bytes[0] = DELETED_MARKER;
    }
    let ext_bytes = &record[8..11];
    (
        name::decode_codepage_ascii(&name_bytes),
        name::decode_codepage_ascii(ext_bytes),
    )
}

/// Exposed for [`crate::volume::Volume::file_entry_by_identifier`], which
/// decodes a single record directly rather than walking a directory's full
/// stream.
pub(crate) fn decode_short_entry(record: &[u8]) -> FileEntry {
    let (name, ext) = short_name_display(record);
    let display_name = name::compose_short_name(&name, &ext);

    let attr = Attributes(short_name_attr(record));
    let fst_clus_hi = read_u16(record, 20) as u32;
    let fst_clus_lo = read_u16(record, 26) as u32;
    let start_cluster = (fst_clus_hi << 16) | fst_clus_lo;

    let crt_time_tenth = record[13];
    let crt_time = read_u16(record, 14);
    let crt_date = read_u16(record, 16);
    let lst_acc_date = read_u16(record, 18);
    let wrt_time = read_u16(record, 22);
    let wrt_date = read_u16(record, 24);
    let size = read_u32(record, 28) as u64;

    FileEntry {
        identifier: start_cluster as u64,
        name: display_name.clone(),
        short_name: Some(display_name),
        attributes: attr,
        access_time: Timestamp::decode(lst_acc_date, 0, None, None),
        creation_time: Timestamp::decode(crt_date, crt_time, Some(crt_time_tenth), None),
        modification_time: Timestamp::decode(wrt_date, wrt_time, None, None),
        size,
        valid_data_length: None,
        start_cluster,
        no_fat_chain: false,
    }
}

/// Decode a directory's already-assembled record stream (one directory's
/// worth of 32-byte records, in on-disk order) into child entries, skipping
/// deleted/`.`/`..` records and terminating at the first all-zero record.
///
/// Returns `(children, volume_label)`; `volume_label` is populated only when
/// a record with `ATTR_VOLUME_LABEL` (and not also an LFN record) is seen —
/// relevant only for the root directory, but harmless to compute elsewhere.
pub fn decode_fat_stream(
    records: &[[u8; RECORD_SIZE]],
    notify: &dyn Notify,
) -> Result<(Vec<FileEntry>, Option<String>)> {
    let mut children = Vec::new();
    let mut label = None;
    let mut pending_lfn: Vec<(u8, [u16; 13])> = Vec::new();
    let mut pending_checksum: Option<u8> = None;

    for record in records {
        if is_all_zero(record) {
            break;
        }
        let first_byte = record[0];
        if first_byte == DELETED_MARKER {
            pending_lfn.clear();
            pending_checksum = None;
            continue;
        }

        let attr = short_name_attr(record);
        if attr & 0x3F == ATTR_LFN {
            let ord = record[0];
            let checksum = record[13];
            let seq = ord & !LAST_LONG_ENTRY;
            let is_last = ord & LAST_LONG_ENTRY != 0;

            let expected_next_seq = pending_lfn.last().map(|(s, _)| s - 1);
            let run_ok = if is_last {
                pending_lfn.is_empty()
            } else {
                expected_next_seq == Some(seq) && pending_checksum == Some(checksum)
            };

            if !run_ok && !is_last {
                // Out-of-order / gapped run: discard what we had, this
                // record cannot start a new run either (no LAST bit).
                notify.notify(Severity::Warning, "discarding LFN run: sequence gap");
                pending_lfn.clear();
                pending_checksum = None;
                continue;
            }
            if is_last {
                pending_lfn.clear();
                pending_checksum = Some(checksum);
            }
            pending_lfn.push((seq, lfn_fragment_units(record)));
            continue;
        }

        // Short-name record: `.` and `..` are consumed but never exposed.
        let (raw_name_bytes, _) = (&record[0..8], &record[8..11]);
        let is_dot = raw_name_bytes[0] == b'.'
            && (raw_name_bytes[1..8].iter().all(|&b| b == b' ')
                || (raw_name_bytes[1] == b'.' && raw_name_bytes[2..8].iter().all(|&b| b == b' ')));

        if attr & ATTR_VOLUME_LABEL as u16 != 0 && pending_lfn.is_empty() {
            label = Some(name::decode_volume_label(&short_name_83_field(record)));
            pending_checksum = None;
            continue;
        }

        let mut entry = decode_short_entry(record);

        if !pending_lfn.is_empty() {
            let field = short_name_83_field(record);
            let expected_checksum = name::lfn_checksum(&field);
            let checksum_ok = pending_checksum == Some(expected_checksum);
            let sequence_ok = {
                let mut seqs: Vec<u8> = pending_lfn.iter().map(|(s, _)| *s).collect();
                seqs.sort_unstable_by(|a, b| b.cmp(a));
                seqs.windows(2).all(|w| w[0] == w[1] + 1) && seqs.last() == Some(&1)
            };

            if checksum_ok && sequence_ok {
                let mut ordered = pending_lfn.clone();
                ordered.sort_by_key(|(seq, _)| *seq);
                let mut units: Vec<u16> = Vec::with_capacity(ordered.len() * 13);
                for (_, frag) in &ordered {
                    units.extend_from_slice(frag);
                }
                entry.name = name::utf16le_to_utf8_truncated(&units);
            } else {
                notify.notify(
                    Severity::Warning,
                    "discarding LFN run: checksum or sequence mismatch, falling back to 8.3",
                );
            }
        }
        pending_lfn.clear();
        pending_checksum = None;

        if is_dot {
            continue;
        }
        children.push(entry);
    }

    Ok((children, label))
}

// ---------------------------------------------------------------------
// exFAT sub-decoder
// ---------------------------------------------------------------------

const EXFAT_VOLUME_LABEL: u8 = 0x83;
const EXFAT_FILE_DIRECTORY: u8 = 0x85;
const EXFAT_STREAM_EXTENSION: u8 = 0xC0;
const EXFAT_FILE_NAME: u8 = 0xC1;
const EXFAT_IN_USE_BIT: u8 = 0x80;

fn decode_exfat_set(
    primary: &[u8; RECORD_SIZE],
    stream: &[u8; RECORD_SIZE],
    name_records: &[[u8; RECORD_SIZE]],
    identifier: u64,
) -> Result<FileEntry> {
    let attr = Attributes(read_u16(primary, 4));

    let create_date = read_u16(primary, 8);
    let create_time = read_u16(primary, 10);
    let modified_date = read_u16(primary, 12);
    let modified_time = read_u16(primary, 14);
    let accessed_date = read_u16(primary, 16);
    let accessed_time = read_u16(primary, 18);
    let create_10ms = primary[20];
    let modified_10ms = primary[21];
    let create_utc = primary[22];
    let modified_utc = primary[23];
    let accessed_utc = primary[24];

    let secondary_flags = stream[1];
    let no_fat_chain = secondary_flags & 0x02 != 0;
    let name_length = stream[3] as usize;
    let valid_data_length = read_u64(stream, 8);
    let first_cluster = read_u32(stream, 20);
    let data_length = read_u64(stream, 24);

    let mut units: Vec<u16> = Vec::with_capacity(name_records.len() * 15);
    for rec in name_records {
        for i in 0..15 {
            units.push(read_u16(rec, 2 + i * 2));
        }
    }
    let name = name::utf16le_to_utf8_exact(&units, name_length);

    Ok(FileEntry {
        identifier,
        name: name.clone(),
        short_name: None,
        attributes: attr,
        access_time: Timestamp::decode(accessed_date, accessed_time, None, Some(accessed_utc)),
        creation_time: Timestamp::decode(
            create_date,
            create_time,
            Some(create_10ms),
            Some(create_utc),
        ),
        modification_time: Timestamp::decode(
            modified_date,
            modified_time,
            Some(modified_10ms),
            Some(modified_utc),
        ),
        size: data_length,
        valid_data_length: Some(valid_data_length),
        start_cluster: first_cluster,
        no_fat_chain,
    })
}

/// Decode an exFAT directory's record stream into child entries, grouping
/// consecutive in-use records into 0x85+0xC0+N×0xC1 sets and validating the
/// whole-set checksum. Malformed or checksum-mismatched sets are skipped
/// with a notify, per spec scenario S6. Also extracts the volume label
/// (0x83 entry), meaningful only for the root directory but harmless
/// elsewhere.
pub fn decode_exfat_stream(
    records: &[[u8; RECORD_SIZE]],
    notify: &dyn Notify,
) -> Result<(Vec<FileEntry>, Option<String>)> {
    let mut children = Vec::new();
    let mut label = None;
    let mut i = 0;
    let mut next_identifier: u64 = 1;

    while i < records.len() {
        let record = &records[i];
        if record[0] & EXFAT_IN_USE_BIT == 0 {
            if record[0] == 0 {
                break;
            }
            i += 1;
            continue;
        }
        if record[0] == EXFAT_VOLUME_LABEL {
            let char_count = (record[1] as usize).min(11);
            let mut units = Vec::with_capacity(11);
            for k in 0..11 {
                units.push(read_u16(record, 2 + k * 2));
            }
            label = Some(name::utf16le_to_utf8_exact(&units, char_count));
            i += 1;
            continue;
        }
        if record[0] != EXFAT_FILE_DIRECTORY {
            // Bitmap / upcase-table / other system entries: not part of a
            // file entry set, skip.
            i += 1;
            continue;
        }

        let secondary_count = record[1] as usize;
        let set_len = 1 + secondary_count;
        if i + set_len > records.len() || secondary_count < 2 {
            notify.notify(Severity::Warning, "discarding malformed exFAT set: truncated");
            i += 1;
            continue;
        }

        let stream = &records[i + 1];
        if stream[0] != EXFAT_STREAM_EXTENSION {
            notify.notify(
                Severity::Warning,
                "discarding malformed exFAT set: missing stream extension",
            );
            i += 1;
            continue;
        }

        let name_length = stream[3] as usize;
        let expected_name_records = name_length.div_ceil(15);
        let name_records_slice = &records[i + 2..i + set_len];
        if name_records_slice.len() != expected_name_records
            || name_records_slice.iter().any(|r| r[0] != EXFAT_FILE_NAME)
        {
            notify.notify(
                Severity::Warning,
                "discarding malformed exFAT set: name record count/type mismatch",
            );
            i += 1;
            continue;
        }

        let stored_checksum = read_u16(record, 2);
        let mut set_bytes: Vec<u8> = Vec::with_capacity(set_len * RECORD_SIZE);
        for r in &records[i..i + set_len] {
            set_bytes.extend_from_slice(r);
        }
        let computed = name::exfat_set_checksum(&set_bytes);
        if computed != stored_checksum {
            notify.notify(
                Severity::Warning,
                &format!("discarding exFAT set at record {i}: checksum mismatch"),
            );
            i += set_len;
            continue;
        }

        let mut name_records = Vec::with_capacity(name_records_slice.len());
        name_records.extend_from_slice(name_records_slice);
        let entry = decode_exfat_set(record, stream, &name_records, next_identifier)?;
        next_identifier += 1;
        children.push(entry);
        i += set_len;
    }

    Ok((children, label))
}
