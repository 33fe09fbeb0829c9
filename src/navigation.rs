//! Folder traversal for one browsing session.
//!
//! A [`Navigator`] owns the breadcrumb stack, from the root folder to the
//! current one, and the classified contents of the current folder. It works
//! the same over either [`ContentAccess`] variant.

use std::sync::Arc;

use crate::access::ContentAccess;
use crate::cache::ContentCache;
use crate::classify::{FolderContents, ListingOptions};
use crate::error::Result;
use crate::models::DriveEntry;

/// One visited folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub id: String,
    pub name: String,
}

impl Breadcrumb {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Where the navigator is in its load cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Uninitialized,
    Loading,
    Ready,
    /// The last load failed with this message. Retry by repeating the action.
    Errored(String),
}

pub struct Navigator<C> {
    client: C,
    cache: Arc<ContentCache>,
    options: ListingOptions,
    stack: Vec<Breadcrumb>,
    contents: FolderContents,
    state: LoadState,
}

impl<C: ContentAccess> Navigator<C> {
    pub fn new(client: C, cache: Arc<ContentCache>) -> Self {
        Self::with_options(client, cache, ListingOptions::default())
    }

    pub fn with_options(client: C, cache: Arc<ContentCache>, options: ListingOptions) -> Self {
        Self {
            client,
            cache,
            options,
            stack: Vec::new(),
            contents: FolderContents::default(),
            state: LoadState::Uninitialized,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    pub fn options(&self) -> ListingOptions {
        self.options
    }

    /// Change the listing options. Takes effect on the next load.
    pub fn set_options(&mut self, options: ListingOptions) {
        self.options = options;
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn breadcrumbs(&self) -> &[Breadcrumb] {
        &self.stack
    }

    pub fn contents(&self) -> &FolderContents {
        &self.contents
    }

    pub fn current_folder(&self) -> Option<&Breadcrumb> {
        self.stack.last()
    }

    /// The breadcrumb before the current one, if any.
    pub fn parent_folder(&self) -> Option<&Breadcrumb> {
        self.stack.len().checked_sub(2).and_then(|i| self.stack.get(i))
    }

    /// Names from the root to the current folder, e.g. `Models / Dragons`.
    pub fn breadcrumb_display(&self) -> String {
        self.stack
            .iter()
            .map(|b| b.name.as_str())
            .collect::<Vec<_>>()
            .join(" / ")
    }

    /// Folder names above the current one, root first.
    pub fn parent_path(&self) -> Vec<String> {
        match self.stack.split_last() {
            Some((_, parents)) => parents.iter().map(|b| b.name.clone()).collect(),
            None => Vec::new(),
        }
    }

    /// Start a session at `root_id` and load it.
    pub async fn initialize(&mut self, root_id: &str, root_name: &str) -> Result<()> {
        self.stack = vec![Breadcrumb::new(root_id, root_name)];
        self.contents = FolderContents::default();
        self.load(root_id.to_string(), true).await
    }

    /// Descend into a folder. The breadcrumb is only pushed once its listing
    /// has loaded, so repeating a failed call does not duplicate it.
    pub async fn navigate_to(&mut self, folder_id: &str, folder_name: &str) -> Result<()> {
        self.load(folder_id.to_string(), true).await?;
        self.stack.push(Breadcrumb::new(folder_id, folder_name));
        Ok(())
    }

    /// Jump back to the breadcrumb at `index`. Out of range is a no-op.
    pub async fn go_back_to(&mut self, index: usize) -> Result<()> {
        let Some(target) = self.stack.get(index).map(|b| b.id.clone()) else {
            tracing::debug!(index, depth = self.stack.len(), "ignoring out-of-range breadcrumb");
            return Ok(());
        };
        self.load(target, true).await?;
        self.stack.truncate(index + 1);
        Ok(())
    }

    /// Reload the current folder, bypassing the listing cache.
    pub async fn refresh(&mut self) -> Result<()> {
        let Some(current) = self.stack.last().map(|b| b.id.clone()) else {
            return Ok(());
        };
        self.load(current, false).await
    }

    async fn load(&mut self, folder_id: String, use_cache: bool) -> Result<()> {
        self.state = LoadState::Loading;
        match self.fetch(&folder_id, use_cache).await {
            Ok(entries) => {
                self.contents = FolderContents::from_entries(self.options.apply(entries));
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(folder_id = %folder_id, error = %e, "folder load failed");
                self.state = LoadState::Errored(e.to_string());
                Err(e)
            }
        }
    }

    async fn fetch(&self, folder_id: &str, use_cache: bool) -> Result<Vec<DriveEntry>> {
        if use_cache {
            if let Some(entries) = self.cache.listing(folder_id) {
                return Ok(entries);
            }
        }
        let entries = self.client.list_folder_contents(folder_id).await?;
        self.cache.set_listing(folder_id, entries.clone());
        Ok(entries)
    }
}
