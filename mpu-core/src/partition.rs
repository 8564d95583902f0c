//! Deterministic split of a file's byte span into upload parts

use crate::{PartDescriptor, Result, UploadError};
use std::path::PathBuf;

/// Ordered part layout for a file of `file_size` bytes.
///
/// Iterating a `Partition` is lazy and restartable: every call to
/// [`Partition::iter`] yields the same descriptors from part 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    file_size: u64,
    part_size: u64,
    total_parts: u32,
}

impl Partition {
    /// Zero-length files are rejected with `EmptyFile`.
    pub fn new(file_size: u64, part_size: u64) -> Result<Self> {
        if part_size == 0 {
            return Err(UploadError::InvalidPartSize(part_size));
        }
        if file_size == 0 {
            return Err(UploadError::EmptyFile {
                path: PathBuf::new(),
            });
        }

        let total_parts = u32::try_from(file_size.div_ceil(part_size)).map_err(|_| {
            UploadError::InvalidPartSize(part_size)
        })?;

        Ok(Partition {
            file_size,
            part_size,
            total_parts,
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    pub fn total_parts(&self) -> u32 {
        self.total_parts
    }

    /// Descriptor for a 1-based part number
    pub fn get(&self, part_number: u32) -> Option<PartDescriptor> {
        if part_number == 0 || part_number > self.total_parts {
            return None;
        }
        let byte_offset = u64::from(part_number - 1) * self.part_size;
        let byte_length = self.part_size.min(self.file_size - byte_offset);
        Some(PartDescriptor {
            part_number,
            byte_offset,
            byte_length,
        })
    }

    pub fn iter(&self) -> PartIter {
        PartIter {
            partition: *self,
            next: 1,
        }
    }
}

impl IntoIterator for &Partition {
    type Item = PartDescriptor;
    type IntoIter = PartIter;

    fn into_iter(self) -> PartIter {
        self.iter()
    }
}

/// Iterator over the descriptors of a [`Partition`]
#[derive(Debug, Clone)]
pub struct PartIter {
    partition: Partition,
    next: u64,
}

impl Iterator for PartIter {
    type Item = PartDescriptor;

    fn next(&mut self) -> Option<PartDescriptor> {
        let part_number = u32::try_from(self.next).ok()?;
        let descriptor = self.partition.get(part_number)?;
        self.next += 1;
        Some(descriptor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (u64::from(self.partition.total_parts) + 1).saturating_sub(self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for PartIter {}
