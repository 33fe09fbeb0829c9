//! In-memory cache for one browsing session.
//!
//! Entries are keyed by Drive id and never expire; ids are stable and
//! thumbnails rarely change mid-session. Only `clear` removes anything.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::DriveEntry;

#[derive(Debug, Default)]
pub struct ContentCache {
    thumbnails: RwLock<HashMap<String, String>>,
    metadata: RwLock<HashMap<String, DriveEntry>>,
    listings: RwLock<HashMap<String, Vec<DriveEntry>>>,
    // `None` records that a search found nothing, so it is not repeated.
    folder_images: RwLock<HashMap<String, Option<String>>>,
}

fn get<V: Clone>(map: &RwLock<HashMap<String, V>>, key: &str) -> Option<V> {
    map.read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(key)
        .cloned()
}

fn put<V>(map: &RwLock<HashMap<String, V>>, key: &str, value: V) {
    map.write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(key.to_string(), value);
}

fn clear_map<V>(map: &RwLock<HashMap<String, V>>) {
    map.write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clear();
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thumbnail(&self, file_id: &str) -> Option<String> {
        get(&self.thumbnails, file_id)
    }

    pub fn set_thumbnail(&self, file_id: &str, url: String) {
        put(&self.thumbnails, file_id, url);
    }

    pub fn metadata(&self, file_id: &str) -> Option<DriveEntry> {
        get(&self.metadata, file_id)
    }

    pub fn set_metadata(&self, entry: DriveEntry) {
        let id = entry.id.clone();
        put(&self.metadata, &id, entry);
    }

    pub fn listing(&self, folder_id: &str) -> Option<Vec<DriveEntry>> {
        get(&self.listings, folder_id)
    }

    /// Store a folder listing and index its entries' metadata.
    pub fn set_listing(&self, folder_id: &str, entries: Vec<DriveEntry>) {
        for entry in &entries {
            self.set_metadata(entry.clone());
        }
        put(&self.listings, folder_id, entries);
    }

    /// Outer `None`: never searched. Inner `None`: searched, nothing found.
    pub fn folder_image(&self, folder_id: &str) -> Option<Option<String>> {
        get(&self.folder_images, folder_id)
    }

    pub fn set_folder_image(&self, folder_id: &str, image_id: Option<String>) {
        put(&self.folder_images, folder_id, image_id);
    }

    pub fn clear(&self) {
        clear_map(&self.thumbnails);
        clear_map(&self.metadata);
        clear_map(&self.listings);
        clear_map(&self.folder_images);
    }
}
