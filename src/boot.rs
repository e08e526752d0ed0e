//! Component C: Boot-Sector Decoder.
//!
//! Parses the first 512 bytes of a volume, classifies the variant, and
//! derives the geometry every other component needs. Grounded on the
//! teacher's `bpb.rs` (`BIOSParameterBlock`/`BasicBPB`/`BPB32`/`FatType`) for
//! the FAT12/16/32 layout and on jmesmon-exfat-rs's `BootSector` for the
//! exFAT field offsets the teacher has no equivalent of.

use alloc::format;
use alloc::string::String;

use crate::error::{self, Result};

/// Which of the four on-disk layouts a volume uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Fat12,
    Fat16,
    Fat32,
    ExFat,
}

impl Variant {
    pub fn is_exfat(&self) -> bool {
        matches!(self, Variant::ExFat)
    }

    /// Width, in bits, of one allocation-table entry for this variant.
    pub fn fat_entry_bits(&self) -> u32 {
        match self {
            Variant::Fat12 => 12,
            Variant::Fat16 => 16,
            Variant::Fat32 | Variant::ExFat => 32,
        }
    }
}

/// Derived volume geometry, the output of the boot-sector decode.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub variant: Variant,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub cluster_size: u64,
    pub num_fats: u32,
    pub fat_offset_bytes: u64,
    pub fat_size_bytes: u64,
    pub cluster_count: u32,
    pub first_data_cluster_offset_bytes: u64,
    /// FAT12/16 only: the root directory is a fixed contiguous range, not a
    /// cluster chain.
    pub root_directory_offset_bytes: Option<u64>,
    pub root_directory_size_bytes: Option<u64>,
    /// FAT32/exFAT only: the root directory's start cluster.
    pub root_directory_cluster: Option<u32>,
    pub volume_serial_number: u32,
    pub volume_label_raw: Option<[u8; 11]>,
}

impl Geometry {
    /// Byte offset of the first byte of `cluster` in the data area.
    /// Only meaningful for `cluster >= 2`.
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        self.first_data_cluster_offset_bytes + (cluster as u64 - 2) * self.cluster_size
    }
}

const BOOT_SIGNATURE_OFFSET: usize = 510;
const EXFAT_OEM_NAME: &[u8; 8] = b"EXFAT   ";

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(b)
}

/// Decode a boot sector, which must be at least 512 bytes.
pub fn decode(sector: &[u8]) -> Result<Geometry> {
    if sector.len() < 512 {
        return Err(error::arg_invalid("boot sector shorter than 512 bytes"));
    }
    if sector[BOOT_SIGNATURE_OFFSET] != 0x55 || sector[BOOT_SIGNATURE_OFFSET + 1] != 0xAA {
        return Err(error::input_signature_mismatch("missing 0x55AA boot signature"));
    }

    if &sector[3..11] == EXFAT_OEM_NAME {
        decode_exfat(sector)
    } else {
        decode_fat(sector)
    }
}

fn decode_exfat(sector: &[u8]) -> Result<Geometry> {
    let bytes_per_sector_shift = sector[108];
    let sectors_per_cluster_shift = sector[109];

    if !(9..=12).contains(&bytes_per_sector_shift) {
        return Err(error::input_unsupported_value(format!(
            "exFAT bytes-per-sector shift {bytes_per_sector_shift} out of range 9..=12"
        )));
    }
    if sectors_per_cluster_shift as u32 + bytes_per_sector_shift as u32 > 25 {
        return Err(error::input_unsupported_value(
            "exFAT cluster size exceeds 32 MiB",
        ));
    }

    let bytes_per_sector = 1u32 << bytes_per_sector_shift;
    let sectors_per_cluster = 1u32 << sectors_per_cluster_shift;
    let cluster_size = bytes_per_sector as u64 * sectors_per_cluster as u64;

    let fat_offset_sectors = read_u32(sector, 80);
    let fat_length_sectors = read_u32(sector, 84);
    let cluster_heap_offset_sectors = read_u32(sector, 88);
    let cluster_count = read_u32(sector, 92);
    let root_cluster = read_u32(sector, 96);
    let volume_serial_number = read_u32(sector, 100);
    let num_fats = sector[110] as u32;

    if fat_offset_sectors < 24 {
        return Err(error::input_corruption("exFAT FAT offset below reserved minimum"));
    }

    let _ = read_u64(sector, 64); // partition_offset, unused by this read-only decoder
    let _ = read_u64(sector, 72); // total volume length in sectors, unused directly

    Ok(Geometry {
        variant: Variant::ExFat,
        bytes_per_sector,
        sectors_per_cluster,
        cluster_size,
        num_fats,
        fat_offset_bytes: fat_offset_sectors as u64 * bytes_per_sector as u64,
        fat_size_bytes: fat_length_sectors as u64 * bytes_per_sector as u64,
        cluster_count,
        first_data_cluster_offset_bytes: cluster_heap_offset_sectors as u64
            * bytes_per_sector as u64,
        root_directory_offset_bytes: None,
        root_directory_size_bytes: None,
        root_directory_cluster: Some(root_cluster),
        volume_serial_number,
        volume_label_raw: None,
    })
}

fn decode_fat(sector: &[u8]) -> Result<Geometry> {
    let bytes_per_sector = read_u16(sector, 11) as u32;
    let sectors_per_cluster = sector[13] as u32;
    let reserved_sectors = read_u16(sector, 14) as u32;
    let num_fats = sector[16] as u32;
    let root_entry_count = read_u16(sector, 17) as u32;
    let total_sectors_16 = read_u16(sector, 19) as u32;
    let fat_size_16 = read_u16(sector, 22) as u32;
    let total_sectors_32 = read_u32(sector, 32);

    if !matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096) {
        return Err(error::input_unsupported_value(format!(
            "unsupported bytes-per-sector {bytes_per_sector}"
        )));
    }
    if sectors_per_cluster == 0 || !sectors_per_cluster.is_power_of_two() {
        return Err(error::input_unsupported_value(format!(
            "unsupported sectors-per-cluster {sectors_per_cluster}"
        )));
    }
    let cluster_size = bytes_per_sector as u64 * sectors_per_cluster as u64;
    if cluster_size > 32 * 1024 * 1024 {
        return Err(error::input_unsupported_value("cluster size exceeds 32 MiB"));
    }

    let is_fat32_layout = root_entry_count == 0 && total_sectors_16 == 0 && fat_size_16 == 0;

    let (fat_size, root_cluster) = if is_fat32_layout {
        let fat_size_32 = read_u32(sector, 36);
        let root_clus = read_u32(sector, 44);
        (fat_size_32, Some(root_clus))
    } else {
        (fat_size_16, None)
    };

    if fat_size == 0 {
        return Err(error::input_corruption("FAT size is zero"));
    }

    let total_sectors = if total_sectors_16 != 0 {
        total_sectors_16
    } else {
        total_sectors_32
    };
    if total_sectors == 0 {
        return Err(error::input_corruption("total sector count is zero"));
    }

    let root_dir_sectors =
        ((root_entry_count * 32) as u64).div_ceil(bytes_per_sector as u64) as u32;

    let data_sectors = total_sectors
        .checked_sub(reserved_sectors)
        .and_then(|v| v.checked_sub(num_fats * fat_size))
        .and_then(|v| v.checked_sub(root_dir_sectors))
        .ok_or_else(|| error::input_corruption("reserved/FAT/root area exceeds total sectors"))?;
    let cluster_count = data_sectors / sectors_per_cluster;

    let variant = if is_fat32_layout {
        Variant::Fat32
    } else if cluster_count < 4085 {
        Variant::Fat12
    } else if cluster_count < 65525 {
        Variant::Fat16
    } else {
        Variant::Fat32
    };

    let fat_offset_bytes = reserved_sectors as u64 * bytes_per_sector as u64;
    let fat_size_bytes = fat_size as u64 * bytes_per_sector as u64;
    let root_directory_size_bytes = root_entry_count as u64 * 32;
    let data_area_start =
        (reserved_sectors as u64 + num_fats as u64 * fat_size as u64) * bytes_per_sector as u64;

    let (root_directory_offset_bytes, root_directory_size_bytes_opt, first_data_cluster_offset, root_directory_cluster) =
        if is_fat32_layout {
            (
                None,
                None,
                data_area_start,
                root_cluster,
            )
        } else {
            (
                Some(data_area_start),
                Some(root_directory_size_bytes),
                data_area_start + root_directory_size_bytes,
                None,
            )
        };

    let volume_label_raw = if is_fat32_layout {
        let mut label = [0u8; 11];
        label.copy_from_slice(&sector[71..82]);
        Some(label)
    } else {
        let mut label = [0u8; 11];
        label.copy_from_slice(&sector[43..54]);
        Some(label)
    };

    let volume_serial_number = if is_fat32_layout {
        read_u32(sector, 67)
    } else {
        read_u32(sector, 39)
    };

    Ok(Geometry {
        variant,
        bytes_per_sector,
        sectors_per_cluster,
        cluster_size,
        num_fats,
        fat_offset_bytes,
        fat_size_bytes,
        cluster_count,
        first_data_cluster_offset_bytes: first_data_cluster_offset,
        root_directory_offset_bytes,
        root_directory_size_bytes: root_directory_size_bytes_opt,
        root_directory_cluster,
        volume_serial_number,
        volume_label_raw,
    })
}

/// Decode the 11-byte `BS_VolLab`/exFAT-absent label field into a trimmed
/// display string, if non-blank. exFAT carries its label as a directory
/// entry instead (see `dirent::ExfatEntry::VolumeLabel`), not in the boot
/// sector, so `Geometry::volume_label_raw` is `None` for exFAT.
pub fn decode_label(raw: &[u8; 11]) -> Option<String> {
    let trimmed = raw
        .iter()
        .rposition(|&b| b != b' ')
        .map(|end| &raw[..=end])
        .unwrap_or(&[]);
    if trimmed.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(trimmed).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fat12_floppy_sector() -> [u8; 512] {
        let mut s = [0u8; 512];
        s[11..13].copy_from_slice(&512u16.to_le_bytes());
        s[13] = 1; // sectors_per_cluster
        s[14..16].copy_from_slice(&1u16.to_le_bytes()); // reserved_sectors
        s[16] = 2; // num_fats
        s[17..19].copy_from_slice(&224u16.to_le_bytes()); // root_entry_count
        s[19..21].copy_from_slice(&2880u16.to_le_bytes()); // total_sectors_16 (1.44MB)
        s[21] = 0xF0;
        s[22..24].copy_from_slice(&9u16.to_le_bytes()); // fat_size_16
        s[43..54].copy_from_slice(b"TESTVOLUME ");
        s[510] = 0x55;
        s[511] = 0xAA;
        s
    }

    #[test]
    fn decodes_fat12_floppy() {
        let geo = decode(&fat12_floppy_sector()).unwrap();
        assert_eq!(geo.variant, Variant::Fat12);
        assert_eq!(geo.bytes_per_sector, 512);
        assert_eq!(geo.root_directory_offset_bytes, Some(19 * 512));
        assert_eq!(decode_label(&geo.volume_label_raw.unwrap()).as_deref(), Some("TESTVOLUME"));
    }

    #[test]
    fn rejects_missing_signature() {
        let mut s = fat12_floppy_sector();
        s[510] = 0;
        assert!(decode(&s).is_err());
    }

    fn exfat_sector() -> [u8; 512] {
        let mut s = [0u8; 512];
        s[3..11].copy_from_slice(b"EXFAT   ");
        s[80..84].copy_from_slice(&2048u32.to_le_bytes()); // fat_offs (sectors)
        s[84..88].copy_from_slice(&8u32.to_le_bytes()); // fat_len (sectors)
        s[88..92].copy_from_slice(&4096u32.to_le_bytes()); // cluster_heap_offs (sectors)
        s[92..96].copy_from_slice(&1000u32.to_le_bytes()); // cluster_count
        s[96..100].copy_from_slice(&5u32.to_le_bytes()); // root cluster
        s[108] = 9; // 512 byte sectors
        s[109] = 3; // 8 sectors per cluster -> 4096 byte clusters
        s[110] = 1;
        s[510] = 0x55;
        s[511] = 0xAA;
        s
    }

    #[test]
    fn decodes_exfat() {
        let geo = decode(&exfat_sector()).unwrap();
        assert_eq!(geo.variant, Variant::ExFat);
        assert_eq!(geo.bytes_per_sector, 512);
        assert_eq!(geo.sectors_per_cluster, 8);
        assert_eq!(geo.cluster_size, 4096);
        assert_eq!(geo.fat_offset_bytes, 2048 * 512);
        assert_eq!(geo.first_data_cluster_offset_bytes, 4096 * 512);
        assert_eq!(geo.root_directory_cluster, Some(5));
    }

    #[test]
    fn rejects_oversized_exfat_cluster() {
        let mut s = exfat_sector();
        s[109] = 20; // 9 + 20 = 29 > 25
        assert!(decode(&s).is_err());
    }
}
