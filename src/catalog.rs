// SPDX-License-Identifier: MIT

//! Catalog traversal: categories, paginated item listings and the nested
//! series → seasons → episodes walk. Calls go through the session manager so
//! an auth rejection mid-walk gets exactly one token refresh.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::errors::{PortalError, retry_transient};
use crate::portal::{Category, CatalogEntry, ContentKind, EpisodeRef, ItemPage, PortalApi};
use crate::session::SessionManager;

/// Result of a category sweep: the collected entries plus the titles of any
/// categories dropped at the page cap, so callers can report them.
#[derive(Debug, Default)]
pub struct CatalogSweep {
    pub entries: Vec<CatalogEntry>,
    pub dropped: Vec<String>,
}

pub struct CatalogFetcher<'a, P> {
    session: &'a mut SessionManager<P>,
    retries: u32,
    backoff: Duration,
    max_pages: u32,
}

impl<'a, P: PortalApi> CatalogFetcher<'a, P> {
    pub fn new(session: &'a mut SessionManager<P>, fetch: &FetchConfig) -> Self {
        Self {
            session,
            retries: fetch.retries,
            backoff: Duration::from_millis(fetch.retry_backoff_ms),
            max_pages: fetch.max_pages,
        }
    }

    /// Fetches the category set for one content kind. An empty set means the
    /// catalog is unreachable or the kind does not exist on this portal, and
    /// is fatal for the run.
    pub async fn categories(&mut self, kind: ContentKind) -> Result<Vec<Category>, PortalError> {
        let first = {
            let session = &*self.session;
            retry_transient(self.retries, self.backoff, || {
                session.portal().categories(session.token_str(), kind)
            })
            .await
        };

        let categories = match first {
            Err(e) if e.is_auth() => {
                self.session.reauth().await?;
                let session = &*self.session;
                let second = retry_transient(self.retries, self.backoff, || {
                    session.portal().categories(session.token_str(), kind)
                })
                .await;
                match second {
                    Err(e) if e.is_auth() => {
                        self.session.fail();
                        return Err(e);
                    }
                    other => other?,
                }
            }
            other => other?,
        };

        if categories.is_empty() {
            return Err(PortalError::Response(format!(
                "portal reported no {kind} categories"
            )));
        }
        Ok(categories)
    }

    /// Collects every entry in the selected categories, in category order.
    /// A category that exceeds the page cap is dropped with a warning; any
    /// other failure aborts the run.
    pub async fn entries(
        &mut self,
        kind: ContentKind,
        categories: &[Category],
    ) -> Result<CatalogSweep, PortalError> {
        let mut sweep = CatalogSweep::default();
        for category in categories {
            match self.category_entries(kind, category).await {
                Ok(mut entries) => {
                    debug!("{}: {} entries", category.title, entries.len());
                    sweep.entries.append(&mut entries);
                }
                Err(e @ PortalError::PageLimit { .. }) => {
                    warn!("skipping category: {e}");
                    sweep.dropped.push(category.title.clone());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(sweep)
    }

    async fn category_entries(
        &mut self,
        kind: ContentKind,
        category: &Category,
    ) -> Result<Vec<CatalogEntry>, PortalError> {
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let ItemPage { entries, has_more } = self.items_page(kind, category, page).await?;

            if kind == ContentKind::Series {
                for series in entries {
                    out.extend(self.episode_entries(series).await?);
                }
            } else {
                out.extend(entries);
            }

            if !has_more {
                break;
            }
            page += 1;
            if page > self.max_pages {
                return Err(PortalError::PageLimit {
                    category: category.title.clone(),
                    pages: self.max_pages,
                });
            }
        }

        // Channels carry a portal-assigned number; honor it, with the id as
        // tie-breaker. Other kinds keep portal arrival order.
        if kind == ContentKind::Channels && out.iter().all(|e| e.number.is_some()) {
            out.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.id.cmp(&b.id)));
        }
        Ok(out)
    }

    async fn items_page(
        &mut self,
        kind: ContentKind,
        category: &Category,
        page: u32,
    ) -> Result<ItemPage, PortalError> {
        let first = {
            let session = &*self.session;
            retry_transient(self.retries, self.backoff, || {
                session.portal().items(session.token_str(), kind, category, page)
            })
            .await
        };

        match first {
            Err(e) if e.is_auth() => {
                self.session.reauth().await?;
                let session = &*self.session;
                let second = retry_transient(self.retries, self.backoff, || {
                    session.portal().items(session.token_str(), kind, category, page)
                })
                .await;
                match second {
                    Err(e) if e.is_auth() => {
                        self.session.fail();
                        Err(e)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Expands one series row into per-episode entries by walking its
    /// seasons. The portal resolves episode links from a synthesized command
    /// naming the series and season; the episode number rides separately.
    async fn episode_entries(
        &mut self,
        series: CatalogEntry,
    ) -> Result<Vec<CatalogEntry>, PortalError> {
        let first = {
            let session = &*self.session;
            retry_transient(self.retries, self.backoff, || {
                session.portal().seasons(session.token_str(), &series)
            })
            .await
        };

        let seasons = match first {
            Err(e) if e.is_auth() => {
                self.session.reauth().await?;
                let session = &*self.session;
                let second = retry_transient(self.retries, self.backoff, || {
                    session.portal().seasons(session.token_str(), &series)
                })
                .await;
                match second {
                    Err(e) if e.is_auth() => {
                        self.session.fail();
                        return Err(e);
                    }
                    other => other?,
                }
            }
            other => other?,
        };

        let mut episodes = Vec::new();
        for season in &seasons {
            let cmd_json = serde_json::json!({
                "series_id": series.id,
                "season_num": season.season,
                "type": "series",
            });
            let cmd = BASE64.encode(cmd_json.to_string());

            for &episode in &season.episodes {
                episodes.push(CatalogEntry {
                    id: format!("{}:{}:{}", series.id, season.season, episode),
                    name: series.name.clone(),
                    category_id: series.category_id.clone(),
                    category_title: series.category_title.clone(),
                    number: None,
                    cmd: cmd.clone(),
                    logo: series.logo.clone(),
                    kind: ContentKind::Series,
                    episode: Some(EpisodeRef {
                        series_id: series.id.clone(),
                        season: season.season,
                        episode,
                    }),
                });
            }
        }
        Ok(episodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakePortal, category, channel_entry};

    fn fetch_config() -> FetchConfig {
        FetchConfig {
            retry_backoff_ms: 1,
            max_pages: 5,
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn empty_category_set_is_fatal() {
        let portal = FakePortal::new().with_tokens(["tok"]);
        let mut session = SessionManager::new(portal);
        session.connect().await.unwrap();

        let mut fetcher = CatalogFetcher::new(&mut session, &fetch_config());
        let err = fetcher.categories(ContentKind::Channels).await.unwrap_err();
        assert!(matches!(err, PortalError::Response(_)));
    }

    #[tokio::test]
    async fn pages_accumulate_until_has_more_clears() {
        let sports = category("1", "Sports");
        let portal = FakePortal::new()
            .with_tokens(["tok"])
            .with_categories([sports.clone()])
            .with_page(
                "1",
                1,
                vec![channel_entry("10", "A", &sports), channel_entry("11", "B", &sports)],
                true,
            )
            .with_page("1", 2, vec![channel_entry("12", "C", &sports)], false);
        let mut session = SessionManager::new(portal);
        session.connect().await.unwrap();

        let mut fetcher = CatalogFetcher::new(&mut session, &fetch_config());
        let sweep = fetcher
            .entries(ContentKind::Channels, &[sports])
            .await
            .unwrap();
        let ids: Vec<&str> = sweep.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["10", "11", "12"]);
        assert!(sweep.dropped.is_empty());
    }

    #[tokio::test]
    async fn lying_pagination_hits_the_page_cap() {
        let sports = category("1", "Sports");
        let mut portal = FakePortal::new()
            .with_tokens(["tok"])
            .with_categories([sports.clone()]);
        // Every page claims more data is coming.
        for page in 1..=6 {
            portal = portal.with_page(
                "1",
                page,
                vec![channel_entry(&format!("{page}"), "Loop", &sports)],
                true,
            );
        }
        let mut session = SessionManager::new(portal);
        session.connect().await.unwrap();

        let mut fetcher = CatalogFetcher::new(&mut session, &fetch_config());
        // The broken category is skipped and reported, not fatal.
        let sweep = fetcher
            .entries(ContentKind::Channels, &[sports.clone()])
            .await
            .unwrap();
        assert!(sweep.entries.is_empty());
        assert_eq!(sweep.dropped, ["Sports"]);

        // Directly, the walk reports the cap.
        let mut fetcher = CatalogFetcher::new(&mut session, &fetch_config());
        let err = fetcher
            .category_entries(ContentKind::Channels, &sports)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::PageLimit { pages: 5, .. }));
    }

    #[tokio::test]
    async fn broken_category_does_not_block_others() {
        let sports = category("1", "Sports");
        let news = category("2", "News");
        let mut portal = FakePortal::new()
            .with_tokens(["tok"])
            .with_categories([sports.clone(), news.clone()])
            .with_page("2", 1, vec![channel_entry("20", "News 24", &news)], false);
        for page in 1..=6 {
            portal = portal.with_page(
                "1",
                page,
                vec![channel_entry(&format!("{page}"), "Loop", &sports)],
                true,
            );
        }
        let mut session = SessionManager::new(portal);
        session.connect().await.unwrap();

        let mut fetcher = CatalogFetcher::new(&mut session, &fetch_config());
        let sweep = fetcher
            .entries(ContentKind::Channels, &[sports, news])
            .await
            .unwrap();
        let ids: Vec<&str> = sweep.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["20"]);
        assert_eq!(sweep.dropped, ["Sports"]);
    }

    #[tokio::test]
    async fn channels_are_ordered_by_number_then_id() {
        let sports = category("1", "Sports");
        let mut first = channel_entry("30", "Third", &sports);
        first.number = Some(3);
        let mut second = channel_entry("10", "First", &sports);
        second.number = Some(1);
        let mut third = channel_entry("09", "Also third", &sports);
        third.number = Some(3);

        let portal = FakePortal::new()
            .with_tokens(["tok"])
            .with_categories([sports.clone()])
            .with_page("1", 1, vec![first, second, third], false);
        let mut session = SessionManager::new(portal);
        session.connect().await.unwrap();

        let mut fetcher = CatalogFetcher::new(&mut session, &fetch_config());
        let sweep = fetcher
            .entries(ContentKind::Channels, &[sports])
            .await
            .unwrap();
        let ids: Vec<&str> = sweep.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["10", "09", "30"]);
    }

    #[tokio::test]
    async fn series_walk_emits_one_entry_per_episode() {
        use crate::portal::SeasonListing;
        use crate::testutil::series_entry;

        let drama = category("7", "Drama");
        let show = series_entry("481", "The Show", &drama);
        let portal = FakePortal::new()
            .with_tokens(["tok"])
            .with_categories([drama.clone()])
            .with_page("7", 1, vec![show], false)
            .with_seasons(
                "481",
                vec![
                    SeasonListing {
                        season: 1,
                        episodes: vec![1, 2],
                    },
                    SeasonListing {
                        season: 2,
                        episodes: vec![1],
                    },
                ],
            );
        let mut session = SessionManager::new(portal);
        session.connect().await.unwrap();

        let mut fetcher = CatalogFetcher::new(&mut session, &fetch_config());
        let entries = fetcher
            .entries(ContentKind::Series, &[drama])
            .await
            .unwrap()
            .entries;

        assert_eq!(entries.len(), 3);
        let refs: Vec<(u32, u32)> = entries
            .iter()
            .map(|e| {
                let r = e.episode.as_ref().unwrap();
                (r.season, r.episode)
            })
            .collect();
        assert_eq!(refs, [(1, 1), (1, 2), (2, 1)]);

        // The synthesized command names the series and season.
        let decoded = BASE64.decode(&entries[2].cmd).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(value["series_id"], "481");
        assert_eq!(value["season_num"], 2);
        assert_eq!(value["type"], "series");
    }

    #[tokio::test]
    async fn auth_rejection_mid_listing_refreshes_once() {
        let sports = category("1", "Sports");
        let portal = FakePortal::new()
            .with_tokens(["tok-1", "tok-2"])
            .with_categories([sports.clone()])
            .with_page("1", 1, vec![channel_entry("10", "A", &sports)], false)
            .with_items_auth_failures(1);
        let mut session = SessionManager::new(portal);
        session.connect().await.unwrap();

        let mut fetcher = CatalogFetcher::new(&mut session, &fetch_config());
        let sweep = fetcher
            .entries(ContentKind::Channels, &[sports])
            .await
            .unwrap();
        assert_eq!(sweep.entries.len(), 1);
        assert_eq!(session.token_str(), "tok-2");
    }

    #[tokio::test]
    async fn auth_rejection_during_the_series_walk_refreshes_once() {
        use crate::portal::SeasonListing;
        use crate::testutil::series_entry;

        let drama = category("7", "Drama");
        let show = series_entry("481", "The Show", &drama);
        let portal = FakePortal::new()
            .with_tokens(["tok-1", "tok-2"])
            .with_categories([drama.clone()])
            .with_page("7", 1, vec![show], false)
            .with_seasons(
                "481",
                vec![SeasonListing {
                    season: 1,
                    episodes: vec![1, 2],
                }],
            )
            .with_seasons_auth_failures(1);
        let mut session = SessionManager::new(portal);
        session.connect().await.unwrap();

        let mut fetcher = CatalogFetcher::new(&mut session, &fetch_config());
        let entries = fetcher
            .entries(ContentKind::Series, &[drama])
            .await
            .unwrap()
            .entries;
        assert_eq!(entries.len(), 2);
        assert_eq!(session.token_str(), "tok-2");
    }
}
