//! Component D: Allocation Table.
//!
//! Loads the first FAT copy once at open and exposes `get_link`. Grounded on
//! the teacher's `fat.rs` (4-byte FAT32 entry reads) generalized across all
//! four widths, plus the special-value ranges from jmesmon-exfat-rs's
//! `FatEntry` for the exFAT column.

use alloc::vec;
use alloc::vec::Vec;

use crate::boot::{Geometry, Variant};
use crate::device::BlockDevice;
use crate::error::{self, Result};

/// Classification of one allocation-table link value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Free,
    Reserved,
    Bad,
    EndOfChain,
    Next(u32),
}

/// Classify a raw cluster-number-shaped value against `variant`'s special
/// ranges, without involving a loaded table. Used to test whether a file's
/// *start* cluster itself already falls in the EOC range (an empty chain),
/// as opposed to [`AllocationTable::link_kind`] which classifies the value
/// a table entry points *at*.
pub fn classify_value(variant: Variant, value: u32) -> LinkKind {
    classify(variant, mask(variant, value))
}

fn classify(variant: Variant, masked: u32) -> LinkKind {
    match variant {
        Variant::Fat12 => match masked {
            0x000 => LinkKind::Free,
            0xFF0..=0xFF6 => LinkKind::Reserved,
            0xFF7 => LinkKind::Bad,
            0xFF8..=0xFFF => LinkKind::EndOfChain,
            next => LinkKind::Next(next),
        },
        Variant::Fat16 => match masked {
            0x0000 => LinkKind::Free,
            0xFFF0..=0xFFF6 => LinkKind::Reserved,
            0xFFF7 => LinkKind::Bad,
            0xFFF8..=0xFFFF => LinkKind::EndOfChain,
            next => LinkKind::Next(next),
        },
        Variant::Fat32 => match masked {
            0x0000_0000 => LinkKind::Free,
            0x0FFF_FFF0..=0x0FFF_FFF6 => LinkKind::Reserved,
            0x0FFF_FFF7 => LinkKind::Bad,
            0x0FFF_FFF8..=0x0FFF_FFFF => LinkKind::EndOfChain,
            next => LinkKind::Next(next),
        },
        Variant::ExFat => match masked {
            0x0000_0000 => LinkKind::Free,
            0xFFFF_FFF7 => LinkKind::Bad,
            0xFFFF_FFF8..=0xFFFF_FFFF => LinkKind::EndOfChain,
            next => LinkKind::Next(next),
        },
    }
}

/// Mask applied to a raw link value before classifying or following it. Only
/// FAT32 reserves bits (the top 4) that must be ignored for chain-following
/// purposes while still being preserved on display (see `raw_link`).
fn mask(variant: Variant, raw: u32) -> u32 {
    match variant {
        Variant::Fat32 => raw & 0x0FFF_FFFF,
        _ => raw,
    }
}

/// The loaded, read-only allocation table for one volume.
pub struct AllocationTable {
    variant: Variant,
    entry_count: u32,
    raw: Vec<u8>,
    reversed: Option<alloc::collections::BTreeMap<u32, u32>>,
}

impl AllocationTable {
    /// Load the first FAT copy from `device` per `geometry`.
    ///
    /// `build_reverse_index`: the reference implementation allocates a
    /// reversed link→cluster index but never meaningfully consumes it; kept
    /// here as an opt-in, off-by-default extra (see DESIGN.md).
    pub fn load(
        device: &dyn BlockDevice,
        geometry: &Geometry,
        build_reverse_index: bool,
    ) -> Result<Self> {
        let len = geometry.fat_size_bytes as usize;
        let mut raw = vec![0u8; len];
        let n = device.read_at(geometry.fat_offset_bytes, &mut raw)?;
        if (n as usize) < len {
            return Err(error::io_read_failed("short read of allocation table"));
        }

        let entry_count = geometry.cluster_count + 2;

        let mut table = AllocationTable {
            variant: geometry.variant,
            entry_count,
            raw,
            reversed: None,
        };

        if build_reverse_index {
            let mut map = alloc::collections::BTreeMap::new();
            for cluster in 2..entry_count {
                if let Ok(LinkKind::Next(next)) = table.link_kind(cluster) {
                    map.insert(next, cluster);
                }
            }
            table.reversed = Some(map);
        }

        Ok(table)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    fn bounds_check(&self, cluster: u32) -> Result<()> {
        if cluster >= self.entry_count {
            return Err(error::arg_out_of_bounds(alloc::format!(
                "cluster {cluster} out of bounds (entry count {})",
                self.entry_count
            )));
        }
        Ok(())
    }

    /// The raw (unmasked) link value stored for `cluster`, preserving
    /// FAT32's ignored top 4 bits for display purposes.
    pub fn raw_link(&self, cluster: u32) -> Result<u32> {
        self.bounds_check(cluster)?;
        Ok(match self.variant {
            Variant::Fat12 => {
                let byte_index = (cluster as usize * 3) / 2;
                let b0 = *self.raw.get(byte_index).unwrap_or(&0) as u32;
                let b1 = *self.raw.get(byte_index + 1).unwrap_or(&0) as u32;
                if cluster % 2 == 0 {
                    b0 | ((b1 & 0x0F) << 8)
                } else {
                    (b0 >> 4) | (b1 << 4)
                }
            }
            Variant::Fat16 => {
                let i = cluster as usize * 2;
                u16::from_le_bytes([self.raw[i], self.raw[i + 1]]) as u32
            }
            Variant::Fat32 | Variant::ExFat => {
                let i = cluster as usize * 4;
                u32::from_le_bytes([
                    self.raw[i],
                    self.raw[i + 1],
                    self.raw[i + 2],
                    self.raw[i + 3],
                ])
            }
        })
    }

    /// `get_link` from the spec: the masked value used for chain-following.
    pub fn get_link(&self, cluster: u32) -> Result<u32> {
        Ok(mask(self.variant, self.raw_link(cluster)?))
    }

    /// Classify `cluster`'s link value (free/reserved/bad/EOC/next).
    pub fn link_kind(&self, cluster: u32) -> Result<LinkKind> {
        Ok(classify(self.variant, self.get_link(cluster)?))
    }

    /// The cluster whose link points at `target`, if the optional reversed
    /// index was built at load time.
    pub fn reverse_lookup(&self, target: u32) -> Option<u32> {
        self.reversed.as_ref().and_then(|m| m.get(&target).copied())
    }
}
