//! Picking a representative image for folders and STL files.
//!
//! Only available when the client can run supplementary queries; in preview
//! mode every lookup reports nothing found.

use std::collections::VecDeque;

use tokio_util::sync::CancellationToken;

use crate::access::ContentAccess;
use crate::cache::ContentCache;
use crate::classify::{classify, EntryKind, FolderContents};
use crate::error::{DriveError, Result};
use crate::models::DriveEntry;

/// Default number of folder levels searched below the starting folder.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// The folder whose preview image is wanted.
#[derive(Debug, Clone, Copy)]
pub struct FolderRef<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub parent_id: Option<&'a str>,
}

fn stem(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(stem, _)| stem)
}

/// Find an image to represent `folder`, returning the image's file id.
///
/// An image in the parent folder named after the folder (`Dragons.png` for
/// `Dragons`) wins. Otherwise the first image found breadth-first inside the
/// folder, at most `max_depth` levels down. Results, including "nothing
/// found" and failures, are cached per folder; a cancelled search is not.
pub async fn find_folder_preview_image<C: ContentAccess + ?Sized>(
    client: &C,
    cache: &ContentCache,
    folder: FolderRef<'_>,
    max_depth: usize,
    cancel: &CancellationToken,
) -> Result<Option<String>> {
    if !client.can_search_files() {
        return Ok(None);
    }
    if let Some(cached) = cache.folder_image(folder.id) {
        return Ok(cached);
    }

    match search(client, folder, max_depth, cancel).await {
        Ok(found) => {
            cache.set_folder_image(folder.id, found.clone());
            Ok(found)
        }
        Err(DriveError::Cancelled) => Err(DriveError::Cancelled),
        Err(e) => {
            tracing::warn!(folder_id = folder.id, error = %e, "folder preview search failed");
            cache.set_folder_image(folder.id, None);
            Err(e)
        }
    }
}

async fn search<C: ContentAccess + ?Sized>(
    client: &C,
    folder: FolderRef<'_>,
    max_depth: usize,
    cancel: &CancellationToken,
) -> Result<Option<String>> {
    if let Some(parent_id) = folder.parent_id {
        let wanted = folder.name.to_lowercase();
        let images = client.search_images(parent_id).await?;
        if let Some(image) = images
            .iter()
            .find(|img| stem(&img.name.to_lowercase()) == Some(wanted.as_str()))
        {
            return Ok(Some(image.id.clone()));
        }
    }

    first_image_within(client, folder.id, max_depth, cancel)
        .await
        .map(|found| found.map(|entry| entry.id))
}

/// First image under `folder_id`, searching level by level.
pub async fn first_image_within<C: ContentAccess + ?Sized>(
    client: &C,
    folder_id: &str,
    max_depth: usize,
    cancel: &CancellationToken,
) -> Result<Option<DriveEntry>> {
    let mut queue = VecDeque::from([(folder_id.to_string(), 0usize)]);

    while let Some((id, depth)) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(DriveError::Cancelled);
        }

        let contents = FolderContents::from_entries(client.list_folder_contents(&id).await?);
        if let Some(image) = contents.images.into_iter().next() {
            tracing::debug!(folder_id, depth, image_id = %image.id, "found preview image");
            return Ok(Some(image));
        }
        if depth < max_depth {
            queue.extend(contents.folders.into_iter().map(|f| (f.id, depth + 1)));
        }
    }

    Ok(None)
}

/// Find an image next to an STL file that shares its base name, such as
/// `dragon.png` or `dragon_preview.jpg` for `dragon.stl`.
pub async fn find_stl_preview_image<C: ContentAccess + ?Sized>(
    client: &C,
    parent_id: &str,
    stl: &DriveEntry,
) -> Result<Option<DriveEntry>> {
    if !client.can_search_files() || classify(stl) != EntryKind::Stl {
        return Ok(None);
    }
    let Some(base) = stem(&stl.name) else {
        return Ok(None);
    };

    let candidates: Vec<String> = ["", "_preview", "_thumbnail"]
        .iter()
        .flat_map(|suffix| {
            ["png", "jpg", "jpeg"]
                .iter()
                .map(move |ext| format!("{}{}.{}", base, suffix, ext).to_lowercase())
        })
        .collect();

    let images = client.search_images(parent_id).await?;
    for candidate in &candidates {
        if let Some(image) = images.iter().find(|img| img.name.to_lowercase() == *candidate) {
            return Ok(Some(image.clone()));
        }
    }
    Ok(None)
}
