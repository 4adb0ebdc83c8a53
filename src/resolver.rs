// SPDX-License-Identifier: MIT

//! Bulk stream-link resolution. This is the only phase with enough volume to
//! need concurrency: catalogs run to thousands of entries and each one costs
//! a portal round-trip.

use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::FetchConfig;
use crate::errors::retry_transient;
use crate::portal::{CatalogEntry, PortalApi, ResolvedEntry};

pub struct LinkResolver<'a, P> {
    portal: &'a P,
    token: &'a str,
    concurrency: usize,
    retries: u32,
    backoff: Duration,
}

impl<'a, P: PortalApi + Sync> LinkResolver<'a, P> {
    pub fn new(portal: &'a P, token: &'a str, fetch: &FetchConfig) -> Self {
        Self {
            portal,
            token,
            concurrency: fetch.concurrency.max(1),
            retries: fetch.retries,
            backoff: Duration::from_millis(fetch.retry_backoff_ms),
        }
    }

    /// Resolves every entry with at most `concurrency` requests in flight.
    /// Transient failures are retried per entry; an entry that exhausts its
    /// retries keeps the error and never aborts the batch. The result order
    /// matches the input order regardless of completion order.
    pub async fn resolve_all(&self, entries: Vec<CatalogEntry>) -> Vec<ResolvedEntry> {
        let progress = ProgressBar::new(entries.len() as u64);
        progress.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} resolving links [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut resolved: Vec<(usize, ResolvedEntry)> = stream::iter(entries.into_iter().enumerate())
            .map(|(index, entry)| {
                let progress = progress.clone();
                async move {
                    let outcome = retry_transient(self.retries, self.backoff, || {
                        self.portal.stream_link(self.token, &entry)
                    })
                    .await;
                    progress.inc(1);
                    (index, ResolvedEntry { entry, outcome })
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        progress.finish_and_clear();

        resolved.sort_by_key(|(index, _)| *index);
        resolved.into_iter().map(|(_, entry)| entry).collect()
    }
}
