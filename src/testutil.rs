// SPDX-License-Identifier: MIT

//! In-memory portal fake shared by the session, catalog and resolver tests.
//! Behavior is scripted per endpoint; no network is involved.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::StatusCode;

use crate::errors::PortalError;
use crate::portal::{
    AccountInfo, CatalogEntry, Category, ContentKind, ItemPage, PortalApi, SeasonListing,
};

pub fn category(id: &str, title: &str) -> Category {
    Category {
        id: id.to_string(),
        title: title.to_string(),
    }
}

pub fn channel_entry(id: &str, name: &str, category: &Category) -> CatalogEntry {
    CatalogEntry {
        id: id.to_string(),
        name: name.to_string(),
        category_id: category.id.clone(),
        category_title: category.title.clone(),
        number: None,
        cmd: format!("http://upstream/ch/{id}"),
        logo: None,
        kind: ContentKind::Channels,
        episode: None,
    }
}

pub fn series_entry(id: &str, name: &str, category: &Category) -> CatalogEntry {
    CatalogEntry {
        id: id.to_string(),
        name: name.to_string(),
        category_id: category.id.clone(),
        category_title: category.title.clone(),
        number: None,
        cmd: String::new(),
        logo: None,
        kind: ContentKind::Series,
        episode: None,
    }
}

#[derive(Default)]
pub struct FakePortal {
    tokens: Mutex<VecDeque<String>>,
    profile_auth_failures: AtomicU32,
    items_auth_failures: AtomicU32,
    seasons_auth_failures: AtomicU32,
    categories: Vec<Category>,
    pages: HashMap<(String, u32), ItemPage>,
    seasons: HashMap<String, Vec<SeasonListing>>,
    link_failures: Mutex<HashMap<String, u32>>,
    link_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens<I, S>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.tokens.lock().unwrap() = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_profile_auth_failures(self, count: u32) -> Self {
        self.profile_auth_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_items_auth_failures(self, count: u32) -> Self {
        self.items_auth_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_seasons_auth_failures(self, count: u32) -> Self {
        self.seasons_auth_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_categories<I>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = Category>,
    {
        self.categories = categories.into_iter().collect();
        self
    }

    pub fn with_page(
        mut self,
        category_id: &str,
        page: u32,
        entries: Vec<CatalogEntry>,
        has_more: bool,
    ) -> Self {
        self.pages
            .insert((category_id.to_string(), page), ItemPage { entries, has_more });
        self
    }

    pub fn with_seasons(mut self, series_id: &str, seasons: Vec<SeasonListing>) -> Self {
        self.seasons.insert(series_id.to_string(), seasons);
        self
    }

    /// The next `count` resolutions of `entry_id` fail with a retryable
    /// server error.
    pub fn with_link_transient_failures(self, entry_id: &str, count: u32) -> Self {
        self.link_failures
            .lock()
            .unwrap()
            .insert(entry_id.to_string(), count);
        self
    }

    pub fn with_link_delay(mut self, delay: Duration) -> Self {
        self.link_delay = Some(delay);
        self
    }

    /// Highest number of simultaneously in-flight `stream_link` calls seen.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl PortalApi for FakePortal {
    async fn handshake(&self) -> Result<String, PortalError> {
        self.tokens
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PortalError::Auth("handshake rejected".into()))
    }

    async fn profile(&self, _token: &str) -> Result<AccountInfo, PortalError> {
        if take_failure(&self.profile_auth_failures) {
            return Err(PortalError::Auth("profile rejected".into()));
        }
        Ok(AccountInfo {
            mac: "00:1A:79:AA:BB:CC".to_string(),
            expiry: Some("January 1, 2099".to_string()),
            status: Some("1".to_string()),
            max_connections: Some("1".to_string()),
        })
    }

    async fn categories(
        &self,
        _token: &str,
        _kind: ContentKind,
    ) -> Result<Vec<Category>, PortalError> {
        Ok(self.categories.clone())
    }

    async fn items(
        &self,
        _token: &str,
        _kind: ContentKind,
        category: &Category,
        page: u32,
    ) -> Result<ItemPage, PortalError> {
        if take_failure(&self.items_auth_failures) {
            return Err(PortalError::Auth("listing rejected".into()));
        }
        Ok(self
            .pages
            .get(&(category.id.clone(), page))
            .cloned()
            .unwrap_or(ItemPage {
                entries: Vec::new(),
                has_more: false,
            }))
    }

    async fn seasons(
        &self,
        _token: &str,
        series: &CatalogEntry,
    ) -> Result<Vec<SeasonListing>, PortalError> {
        if take_failure(&self.seasons_auth_failures) {
            return Err(PortalError::Auth("season listing rejected".into()));
        }
        Ok(self.seasons.get(&series.id).cloned().unwrap_or_default())
    }

    async fn stream_link(
        &self,
        _token: &str,
        entry: &CatalogEntry,
    ) -> Result<String, PortalError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.link_delay {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let mut failures = self.link_failures.lock().unwrap();
            match failures.get_mut(&entry.id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    Err(PortalError::Http(StatusCode::INTERNAL_SERVER_ERROR))
                }
                _ => Ok(format!("http://stream/{}", entry.id)),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
