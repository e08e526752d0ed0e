//! Component A: Block Device.
//!
//! The core never writes; `BlockDevice` is deliberately read-only, unlike
//! the teacher's `read_blocks`/`write_blocks` pair.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{self, Result};

/// Abstracted random-access byte source with a known length.
///
/// `read_at` returns the number of bytes actually placed into `out`. A short
/// read is only valid when the requested range extends past [`BlockDevice::size`];
/// a short read inside the device's declared bounds is an I/O error.
pub trait BlockDevice: Send + Sync {
    fn read_at(&self, offset: u64, out: &mut [u8]) -> Result<u32>;
    fn size(&self) -> u64;
}

/// An in-memory block device, used by this crate's own tests to build the
/// synthetic images described for the end-to-end scenarios, and a
/// convenient device for embedded callers that already hold the whole image
/// in RAM.
pub struct MemoryDevice {
    data: Vec<u8>,
}

impl MemoryDevice {
    pub fn new(data: Vec<u8>) -> Self {
        MemoryDevice { data }
    }

    pub fn zeroed(len: usize) -> Self {
        MemoryDevice { data: vec![0u8; len] }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl BlockDevice for MemoryDevice {
    fn read_at(&self, offset: u64, out: &mut [u8]) -> Result<u32> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            out.fill(0);
            return Ok(0);
        }
        let available = self.data.len() - offset;
        let n = available.min(out.len());
        out[..n].copy_from_slice(&self.data[offset..offset + n]);
        if n < out.len() {
            out[n..].fill(0);
        }
        Ok(n as u32)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A `BlockDevice` over a byte range of another device, realizing the
/// `-o offset` / `volume_offset` parameter for a FAT volume embedded inside a
/// larger disk image (spec scenario S2).
pub struct OffsetDevice<D> {
    inner: D,
    offset: u64,
}

impl<D: BlockDevice> OffsetDevice<D> {
    pub fn new(inner: D, offset: u64) -> Result<Self> {
        if offset > inner.size() {
            return Err(error::arg_out_of_bounds("volume offset exceeds device size"));
        }
        Ok(OffsetDevice { inner, offset })
    }
}

impl<D: BlockDevice> BlockDevice for OffsetDevice<D> {
    fn read_at(&self, offset: u64, out: &mut [u8]) -> Result<u32> {
        self.inner.read_at(self.offset + offset, out)
    }

    fn size(&self) -> u64 {
        self.inner.size().saturating_sub(self.offset)
    }
}

#[cfg(feature = "std")]
mod std_file {
    use super::*;
    use std::fs::File;
    use std::io;

    /// A [`BlockDevice`] over a `std::fs::File`, the idiomatic replacement
    /// for the teacher's seek-then-read `BlockFile`: positional reads avoid
    /// the seek races a shared `File` would otherwise need a lock to avoid.
    pub struct StdFile {
        file: File,
        size: u64,
    }

    impl StdFile {
        pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
            let file = File::open(path).map_err(|e| error::io_read_failed(alloc::format!("{e}")))?;
            let size = file
                .metadata()
                .map_err(|e| error::io_read_failed(alloc::format!("{e}")))?
                .len();
            Ok(StdFile { file, size })
        }

        fn read_at_impl(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            #[cfg(unix)]
            {
                use std::os::unix::fs::FileExt;
                self.file.read_at(buf, offset)
            }
            #[cfg(not(unix))]
            {
                use std::io::{Read, Seek, SeekFrom};
                let mut file = &self.file;
                file.seek(SeekFrom::Start(offset))?;
                file.read(buf)
            }
        }
    }

    impl BlockDevice for StdFile {
        fn read_at(&self, offset: u64, out: &mut [u8]) -> Result<u32> {
            if offset >= self.size {
                out.fill(0);
                return Ok(0);
            }
            let n = self
                .read_at_impl(offset, out)
                .map_err(|e| error::io_read_failed(alloc::format!("{e}")))?;
            Ok(n as u32)
        }

        fn size(&self) -> u64 {
            self.size
        }
    }
}

#[cfg(feature = "std")]
pub use std_file::StdFile;
