//! Thumbnail store
//!
//! Ephemeral map from a variant selection to the last frame captured for it.
//! No eviction; the whole store is dropped with the session.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use glam::UVec2;
use log::debug;

use crate::host::CapturedFrame;
use crate::model::VariantSelection;

/// One captured preview image (RGBA8)
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub selection: VariantSelection,
    pub pixels: Vec<u8>,
    /// Resolution the frame was captured at
    pub resolution: UVec2,
    pub captured_at: DateTime<Utc>,
}

impl Thumbnail {
    pub fn from_frame(selection: VariantSelection, frame: CapturedFrame) -> Self {
        Self {
            selection,
            pixels: frame.pixels,
            resolution: frame.resolution,
            captured_at: Utc::now(),
        }
    }

    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Usage counters for the store
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ThumbnailStatistics {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
    /// Times a newer capture replaced an existing entry
    pub overwrites: usize,
    /// Sum of all pixel buffers
    pub estimated_memory_usage: usize,
}

impl ThumbnailStatistics {
    pub fn hit_ratio(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }
}

/// At most one thumbnail per selection; a newer capture overwrites
#[derive(Debug, Default)]
pub struct ThumbnailStore {
    entries: HashMap<VariantSelection, Thumbnail>,
    stats: ThumbnailStatistics,
}

impl ThumbnailStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, thumbnail: Thumbnail) {
        let size = thumbnail.byte_size();
        if let Some(old) = self.entries.insert(thumbnail.selection.clone(), thumbnail) {
            self.stats.overwrites += 1;
            self.stats.estimated_memory_usage -= old.byte_size();
        }
        self.stats.estimated_memory_usage += size;
        self.stats.entries = self.entries.len();
    }

    /// Look up a thumbnail, counting the access
    pub fn get(&mut self, selection: &VariantSelection) -> Option<&Thumbnail> {
        match self.entries.get(selection) {
            Some(thumbnail) => {
                self.stats.hits += 1;
                Some(thumbnail)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Look up without touching the statistics
    pub fn peek(&self, selection: &VariantSelection) -> Option<&Thumbnail> {
        self.entries.get(selection)
    }

    pub fn contains(&self, selection: &VariantSelection) -> bool {
        self.entries.contains_key(selection)
    }

    /// Drop every thumbnail of one node
    pub fn remove_node(&mut self, node_path: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.node_path != node_path);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Dropped {} thumbnails of {}", removed, node_path);
        }
        self.recount();
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recount();
    }

    /// Thumbnails of one node, in no particular order
    pub fn for_node<'a>(&'a self, node_path: &'a str) -> impl Iterator<Item = &'a Thumbnail> + 'a {
        self.entries
            .values()
            .filter(move |thumbnail| thumbnail.selection.node_path == node_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &ThumbnailStatistics {
        &self.stats
    }

    fn recount(&mut self) {
        self.stats.entries = self.entries.len();
        self.stats.estimated_memory_usage = self.entries.values().map(Thumbnail::byte_size).sum();
    }
}
