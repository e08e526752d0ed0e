#![no_std]
//! Read-only inspection library for FAT12/16/32 and exFAT volumes.
//!
//! Entry point is [`volume::Volume::open`], given any [`device::BlockDevice`].
//! Everything downstream (boot-sector decode, allocation-table loading,
//! directory traversal, name/time decoding) is reachable through the
//! returned [`volume::Volume`] and its [`volume::FileEntry`] handles; the
//! per-component modules are public mainly so a caller can work one layer
//! down (e.g. decode a boot sector without opening a full volume).

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod abort;
pub mod boot;
pub mod cache;
pub mod chain;
pub mod device;
pub mod dir;
pub mod dirent;
pub mod error;
pub mod fat;
pub mod name;
pub mod path;
pub mod stream;
pub mod time;
pub mod volume;

pub use boot::Variant;
pub use device::BlockDevice;
pub use dirent::{Attributes, Notify, Severity};
pub use error::{Code, Domain, Error, Result};
pub use time::Timestamp;
pub use volume::{FileEntry, OpenOptions, SharedVolume, Volume};
