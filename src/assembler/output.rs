// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Output sink abstraction and the in-memory patch image.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Where rendered line nodes deliver their bytes.
///
/// Writes may arrive overlapping and out of offset order; re-writing the
/// same offset must be tolerated (last write wins).
pub trait OutputSink {
    fn write(&mut self, offset: usize, bytes: &[u8]);
    fn commit(&mut self) -> io::Result<()>;
}

/// Sparse in-memory image keyed by offset.
#[derive(Default)]
pub struct PatchImage {
    bytes: HashMap<usize, u8>,
    committed: bool,
}

impl PatchImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn num_bytes(&self) -> usize {
        self.bytes.len()
    }

    pub fn committed(&self) -> bool {
        self.committed
    }

    /// All written `(offset, byte)` pairs, sorted by offset.
    pub fn entries(&self) -> Vec<(usize, u8)> {
        let mut entries: Vec<(usize, u8)> = self.bytes.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|e| e.0);
        entries
    }

    /// The `(min, max)` offset range of written bytes.
    pub fn range(&self) -> Option<(usize, usize)> {
        let min = self.bytes.keys().min()?;
        let max = self.bytes.keys().max()?;
        Some((*min, *max))
    }

    /// Overlay the written bytes onto `base`, growing it if required.
    pub fn apply_to(&self, base: &mut Vec<u8>) {
        for (offset, value) in self.entries() {
            if offset >= base.len() {
                base.resize(offset + 1, 0);
            }
            base[offset] = value;
        }
    }

    /// Write a contiguous binary covering offset 0 through the highest
    /// written offset, with gaps zero-filled. Overlays onto the contents of
    /// `base` when given.
    pub fn write_bin_file(&self, path: &Path, base: Option<&Path>) -> io::Result<()> {
        let mut image = match base {
            Some(base) => fs::read(base)?,
            None => Vec::new(),
        };
        self.apply_to(&mut image);
        fs::write(path, image)
    }
}

impl OutputSink for PatchImage {
    fn write(&mut self, offset: usize, bytes: &[u8]) {
        for (ix, value) in bytes.iter().enumerate() {
            self.bytes.insert(offset + ix, *value);
        }
    }

    fn commit(&mut self) -> io::Result<()> {
        self.committed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_writes_are_last_write_wins() {
        let mut image = PatchImage::new();
        image.write(0x10, &[0xAA, 0xBB]);
        image.write(0x11, &[0xCC]);
        assert_eq!(image.entries(), vec![(0x10, 0xAA), (0x11, 0xCC)]);
        // Re-writing the same offset with the same bytes is a no-op.
        image.write(0x10, &[0xAA]);
        assert_eq!(image.num_bytes(), 2);
    }

    #[test]
    fn out_of_order_writes_sort_in_entries() {
        let mut image = PatchImage::new();
        image.write(0x20, &[0x02]);
        image.write(0x00, &[0x01]);
        assert_eq!(image.entries(), vec![(0x00, 0x01), (0x20, 0x02)]);
        assert_eq!(image.range(), Some((0x00, 0x20)));
    }

    #[test]
    fn apply_to_fills_gaps_with_zero() {
        let mut image = PatchImage::new();
        image.write(0x03, &[0xFF]);
        let mut base = vec![0x11, 0x22];
        image.apply_to(&mut base);
        assert_eq!(base, vec![0x11, 0x22, 0x00, 0xFF]);
    }

    #[test]
    fn commit_marks_the_image() {
        let mut image = PatchImage::new();
        assert!(!image.committed());
        image.commit().unwrap();
        assert!(image.committed());
    }
}
