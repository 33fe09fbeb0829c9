//! Classification of folder children into folders, images and STL files.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::models::DriveEntry;

/// What a listed entry is, from the browser's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    Image,
    Stl,
    Other,
}

/// Classify an entry by MIME type first, then by file name.
pub fn classify(entry: &DriveEntry) -> EntryKind {
    if entry.is_folder() {
        EntryKind::Folder
    } else if entry.mime_type.starts_with("image/") {
        EntryKind::Image
    } else if is_stl_name(&entry.name) {
        EntryKind::Stl
    } else {
        EntryKind::Other
    }
}

pub fn is_stl_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".stl")
}

/// The children of one folder, partitioned. Entries of any other kind are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderContents {
    #[serde(default)]
    pub folders: Vec<DriveEntry>,
    #[serde(default)]
    pub images: Vec<DriveEntry>,
    #[serde(default)]
    pub stl_files: Vec<DriveEntry>,
}

impl FolderContents {
    pub fn from_entries(entries: impl IntoIterator<Item = DriveEntry>) -> Self {
        let mut contents = Self::default();
        for entry in entries {
            match classify(&entry) {
                EntryKind::Folder => contents.folders.push(entry),
                EntryKind::Image => contents.images.push(entry),
                EntryKind::Stl => contents.stl_files.push(entry),
                EntryKind::Other => {}
            }
        }
        contents
    }

    /// Flatten back into one list: folders, then images, then STL files.
    pub fn into_entries(self) -> Vec<DriveEntry> {
        let mut entries = self.folders;
        entries.extend(self.images);
        entries.extend(self.stl_files);
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.images.is_empty() && self.stl_files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.folders.len() + self.images.len() + self.stl_files.len()
    }
}

/// Sort order applied to each partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortOrder {
    /// Case-insensitive by name, with digit runs compared numerically.
    #[default]
    Alphabetical,
    /// Most recently modified first.
    Modified,
    /// Largest first.
    Size,
}

/// How a listing is filtered and ordered before classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingOptions {
    pub show_hidden: bool,
    pub sort: SortOrder,
}

impl ListingOptions {
    pub fn apply(&self, mut entries: Vec<DriveEntry>) -> Vec<DriveEntry> {
        if !self.show_hidden {
            entries.retain(|e| !e.name.starts_with('.'));
        }
        match self.sort {
            SortOrder::Alphabetical => entries.sort_by(|a, b| natural_cmp(&a.name, &b.name)),
            // RFC 3339 timestamps from Drive order lexically.
            SortOrder::Modified => entries.sort_by(|a, b| b.modified_time.cmp(&a.modified_time)),
            SortOrder::Size => entries.sort_by(|a, b| b.size.unwrap_or(0).cmp(&a.size.unwrap_or(0))),
        }
        entries
    }
}

/// Compare names so that `part2` sorts before `part10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ln = take_number(&mut left);
                let rn = take_number(&mut right);
                let ord = ln
                    .trim_start_matches('0')
                    .len()
                    .cmp(&rn.trim_start_matches('0').len())
                    .then_with(|| ln.trim_start_matches('0').cmp(rn.trim_start_matches('0')));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                let ord = l.to_lowercase().cmp(r.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}
