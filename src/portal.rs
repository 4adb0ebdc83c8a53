// SPDX-License-Identifier: MIT

//! Low-level Stalker/Ministra portal client and the typed records it returns.
//!
//! Every call identifies the device with a `mac=` cookie and a set-top-box
//! user agent; authenticated calls add a bearer token obtained from the
//! handshake. Responses arrive wrapped in a `{"js": ...}` envelope, with
//! numbers and strings used interchangeably, so parsing is deliberately
//! lenient about scalar types and strict about required fields.

use std::time::Duration;

use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::errors::PortalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Channels,
    Vod,
    Series,
}

impl ContentKind {
    /// The `type=` discriminator the portal expects.
    pub fn portal_type(self) -> &'static str {
        match self {
            ContentKind::Channels => "itv",
            ContentKind::Vod => "vod",
            ContentKind::Series => "series",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ContentKind::Channels => "channels",
            ContentKind::Vod => "VOD",
            ContentKind::Series => "series",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub title: String,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Account snapshot fetched once per run. Stalker portals report the expiry
/// date in the `phone` field; `status` and `max_connections` are optional on
/// many installs.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub mac: String,
    pub expiry: Option<String>,
    pub status: Option<String>,
    pub max_connections: Option<String>,
}

/// Series/season/episode coordinates for episode entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRef {
    pub series_id: String,
    pub season: u32,
    pub episode: u32,
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub category_id: String,
    pub category_title: String,
    /// Portal-assigned channel number, used as an ordering hint.
    pub number: Option<u32>,
    /// Raw portal stream reference; empty only for intermediate series rows.
    pub cmd: String,
    pub logo: Option<String>,
    pub kind: ContentKind,
    pub episode: Option<EpisodeRef>,
}

/// Terminal per-entry state: exactly one of a playable URL or the error that
/// exhausted resolution.
#[derive(Debug)]
pub struct ResolvedEntry {
    pub entry: CatalogEntry,
    pub outcome: Result<String, PortalError>,
}

impl ResolvedEntry {
    pub fn url(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }
}

#[derive(Debug, Clone)]
pub struct ItemPage {
    pub entries: Vec<CatalogEntry>,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct SeasonListing {
    pub season: u32,
    pub episodes: Vec<u32>,
}

/// Portal operations the catalog walker and link resolver are written
/// against. The production implementation is [`PortalClient`]; tests use an
/// in-memory fake.
#[allow(async_fn_in_trait)]
pub trait PortalApi {
    async fn handshake(&self) -> Result<String, PortalError>;
    async fn profile(&self, token: &str) -> Result<AccountInfo, PortalError>;
    async fn categories(
        &self,
        token: &str,
        kind: ContentKind,
    ) -> Result<Vec<Category>, PortalError>;
    async fn items(
        &self,
        token: &str,
        kind: ContentKind,
        category: &Category,
        page: u32,
    ) -> Result<ItemPage, PortalError>;
    async fn seasons(
        &self,
        token: &str,
        series: &CatalogEntry,
    ) -> Result<Vec<SeasonListing>, PortalError>;
    async fn stream_link(&self, token: &str, entry: &CatalogEntry)
    -> Result<String, PortalError>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

fn number_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(D::Error::custom("expected string or number")),
    }
}

fn optional_number_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(D::Error::custom("expected string, number, or null")),
    }
}

fn optional_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.as_u64()),
        Value::String(s) => Ok(s.parse().ok()),
        _ => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
struct JsEnvelope<T> {
    js: T,
}

#[derive(Debug, Deserialize)]
struct HandshakePayload {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfilePayload {
    #[serde(default)]
    mac: Option<String>,
    // Expiry date; Stalker quirk.
    #[serde(default)]
    phone: Option<String>,
    #[serde(default, deserialize_with = "optional_number_as_string")]
    status: Option<String>,
    #[serde(default, deserialize_with = "optional_number_as_string")]
    max_online: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryPayload {
    #[serde(deserialize_with = "number_as_string")]
    id: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct CmdPayload {
    url: String,
}

/// One row of a `get_ordered_list` response. The same endpoint serves
/// channels, VOD titles, series listings and season listings, so most fields
/// are optional and per-kind validation happens in [`catalog_entry`].
#[derive(Debug, Deserialize)]
struct ItemPayload {
    #[serde(deserialize_with = "number_as_string")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "optional_number_as_string")]
    number: Option<String>,
    #[serde(default)]
    cmd: Option<String>,
    #[serde(default)]
    cmds: Vec<CmdPayload>,
    #[serde(default)]
    logo: Option<String>,
    #[serde(default)]
    screenshot_uri: Option<String>,
    /// Episode numbers, present on season rows only.
    #[serde(default)]
    series: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct OrderedListPayload {
    #[serde(default, deserialize_with = "optional_count")]
    total_items: Option<u64>,
    #[serde(default, deserialize_with = "optional_count")]
    max_page_items: Option<u64>,
    #[serde(default)]
    data: Vec<ItemPayload>,
}

#[derive(Debug, Deserialize)]
struct CreateLinkPayload {
    #[serde(default)]
    cmd: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PortalClient {
    client: Client,
    base_url: String,
    mac: String,
    portal_path: String,
}

impl PortalClient {
    pub fn new(portal_url: &str, mac: &str, config: &Config) -> anyhow::Result<Self> {
        use anyhow::Context;

        let url = Url::parse(portal_url).with_context(|| "Invalid portal URL")?;
        anyhow::ensure!(
            matches!(url.scheme(), "http" | "https"),
            "Portal URL must use http or https"
        );
        let host = url
            .host_str()
            .with_context(|| "Portal URL is missing a host")?;

        let base_url = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.fetch.timeout_secs))
                .user_agent(config.portal.user_agent.clone())
                .redirect(reqwest::redirect::Policy::none())
                .build()?,
            base_url,
            mac: mac.to_uppercase(),
            portal_path: config.portal.path.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_js<T>(&self, query: &str, token: Option<&str>) -> Result<T, PortalError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}?{}", self.base_url, self.portal_path, query);
        debug!("portal request: {url}");

        let mut request = self
            .client
            .get(&url)
            .header(header::COOKIE, format!("mac={}", self.mac));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PortalError::Auth(format!("portal returned HTTP {status}")));
        }
        if !status.is_success() {
            return Err(PortalError::Http(status));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Err(PortalError::Response("empty response body".into()));
        }

        serde_json::from_str(&text)
            .map_err(|e| PortalError::Response(format!("{e} in: {}", snippet(&text))))
    }

    async fn create_link(
        &self,
        portal_type: &str,
        cmd: &str,
        episode: Option<u32>,
        token: &str,
    ) -> Result<String, PortalError> {
        let mut query = format!(
            "type={}&action=create_link&cmd={}&JsHttpRequest=1-xml",
            portal_type,
            urlencoding::encode(cmd)
        );
        if let Some(episode) = episode {
            query.push_str(&format!("&series={episode}"));
        }

        let payload: JsEnvelope<CreateLinkPayload> = self.get_js(&query, Some(token)).await?;
        playable_from_cmd(&payload.js.cmd).ok_or_else(|| {
            PortalError::Response(format!(
                "create_link returned no playable URL: {:?}",
                payload.js.cmd
            ))
        })
    }
}

impl PortalApi for PortalClient {
    async fn handshake(&self) -> Result<String, PortalError> {
        let payload: JsEnvelope<HandshakePayload> = self
            .get_js("action=handshake&type=stb&token=&JsHttpRequest=1-xml", None)
            .await?;

        match payload.js.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(PortalError::Auth("handshake returned no token".into())),
        }
    }

    async fn profile(&self, token: &str) -> Result<AccountInfo, PortalError> {
        let payload: JsEnvelope<ProfilePayload> = self
            .get_js(
                "type=account_info&action=get_main_info&JsHttpRequest=1-xml",
                Some(token),
            )
            .await?;

        Ok(AccountInfo {
            mac: payload.js.mac.unwrap_or_else(|| self.mac.clone()),
            expiry: payload.js.phone,
            status: payload.js.status,
            max_connections: payload.js.max_online,
        })
    }

    async fn categories(
        &self,
        token: &str,
        kind: ContentKind,
    ) -> Result<Vec<Category>, PortalError> {
        let query = match kind {
            ContentKind::Channels => "type=itv&action=get_genres&JsHttpRequest=1-xml".to_string(),
            _ => format!(
                "type={}&action=get_categories&JsHttpRequest=1-xml",
                kind.portal_type()
            ),
        };

        let payload: JsEnvelope<Vec<CategoryPayload>> = self.get_js(&query, Some(token)).await?;

        Ok(payload
            .js
            .into_iter()
            // The synthetic "All" pseudo-category would double every entry.
            .filter(|c| c.id != "*")
            .map(|c| Category {
                id: c.id,
                title: c.title,
            })
            .collect())
    }

    async fn items(
        &self,
        token: &str,
        kind: ContentKind,
        category: &Category,
        page: u32,
    ) -> Result<ItemPage, PortalError> {
        let mut query = format!(
            "type={}&action=get_ordered_list&movie_id=0&season_id=0&episode_id=0&row=0\
             &JsHttpRequest=1-xml&sortby=added&fav=0&hd=0&not_ended=0&abc=*&years=*&search=&p={}",
            kind.portal_type(),
            page
        );
        match kind {
            ContentKind::Channels => query.push_str(&format!("&genre={}", category.id)),
            _ => query.push_str(&format!("&category={}&genre=*", category.id)),
        }

        let payload: JsEnvelope<OrderedListPayload> = self.get_js(&query, Some(token)).await?;
        let list = payload.js;

        let returned = list.data.len();
        let entries = list
            .data
            .into_iter()
            .filter_map(|item| catalog_entry(item, kind, category))
            .collect();

        Ok(ItemPage {
            entries,
            has_more: compute_has_more(page, list.total_items, list.max_page_items, returned),
        })
    }

    async fn seasons(
        &self,
        token: &str,
        series: &CatalogEntry,
    ) -> Result<Vec<SeasonListing>, PortalError> {
        let query = format!(
            "type=series&action=get_ordered_list&movie_id={}&season_id=0&episode_id=0&row=0\
             &JsHttpRequest=1-xml&category={}&sortby=added&fav=0&hd=0&not_ended=0&abc=*&genre=*\
             &years=*&search=&p=1",
            urlencoding::encode(&series.id),
            series.category_id
        );

        let payload: JsEnvelope<OrderedListPayload> = self.get_js(&query, Some(token)).await?;

        let mut seasons = Vec::new();
        for row in payload.js.data {
            // Season rows carry ids of the form "<series>:<season>".
            let Some(season) = row.id.split(':').nth(1).and_then(|s| s.parse().ok()) else {
                warn!("skipping season row with unrecognized id {:?}", row.id);
                continue;
            };
            seasons.push(SeasonListing {
                season,
                episodes: row.series,
            });
        }
        Ok(seasons)
    }

    async fn stream_link(
        &self,
        token: &str,
        entry: &CatalogEntry,
    ) -> Result<String, PortalError> {
        match entry.kind {
            ContentKind::Channels => {
                if entry.cmd.contains("localhost") {
                    if let Some(channel) = local_channel_id(&entry.cmd) {
                        return Ok(format!(
                            "{}/play/live.php?mac={}&stream={}&extension=ts",
                            self.base_url, self.mac, channel
                        ));
                    }
                } else if entry.cmd.starts_with("http") {
                    // Direct URL embedded in the channel listing; nothing to
                    // resolve portal-side.
                    return Ok(entry.cmd.clone());
                }
                self.create_link("itv", &entry.cmd, None, token).await
            }
            ContentKind::Vod | ContentKind::Series => {
                let episode = entry.episode.as_ref().map(|e| e.episode);
                self.create_link("vod", &entry.cmd, episode, token).await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn catalog_entry(item: ItemPayload, kind: ContentKind, category: &Category) -> Option<CatalogEntry> {
    let name = match item.name {
        Some(name) if !name.trim().is_empty() => name,
        _ => {
            warn!("skipping {kind} row {} without a name", item.id);
            return None;
        }
    };

    let (id, cmd) = match kind {
        ContentKind::Channels => {
            let cmd = item
                .cmds
                .first()
                .map(|c| c.url.clone())
                .or(item.cmd)
                .map(|c| strip_ffmpeg(&c))?;
            if cmd.is_empty() {
                warn!("skipping channel {name:?} without a stream command");
                return None;
            }
            (item.id, cmd)
        }
        ContentKind::Vod => {
            let Some(cmd) = item.cmd.map(|c| strip_ffmpeg(&c)).filter(|c| !c.is_empty()) else {
                warn!("skipping VOD title {name:?} without a stream command");
                return None;
            };
            (item.id, cmd)
        }
        // Series rows are intermediate: the per-episode command is
        // synthesized later from series id and season number.
        ContentKind::Series => {
            let id = item.id.split(':').next().unwrap_or(&item.id).to_string();
            (id, String::new())
        }
    };

    Some(CatalogEntry {
        id,
        name,
        category_id: category.id.clone(),
        category_title: category.title.clone(),
        number: item.number.as_deref().and_then(|n| n.parse().ok()),
        cmd,
        logo: item.logo.or(item.screenshot_uri).filter(|l| !l.is_empty()),
        kind,
        episode: None,
    })
}

fn strip_ffmpeg(cmd: &str) -> String {
    cmd.strip_prefix("ffmpeg ").unwrap_or(cmd).trim().to_string()
}

/// Extracts the playable URL from a `create_link` response command such as
/// `"ffmpeg http://host/stream"`.
fn playable_from_cmd(cmd: &str) -> Option<String> {
    let candidate = cmd.split_whitespace().last()?;
    candidate.starts_with("http").then(|| candidate.to_string())
}

/// Pulls the numeric channel id out of a `localhost/ch/<id>_` command so it
/// can be rewritten into a direct play URL.
fn local_channel_id(cmd: &str) -> Option<&str> {
    let rest = &cmd[cmd.find("/ch/")? + 4..];
    let id = &rest[..rest.find('_')?];
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then_some(id)
}

/// Pagination: trust total/page-size counts when the portal reports them,
/// otherwise keep going until a page comes back empty.
fn compute_has_more(
    page: u32,
    total_items: Option<u64>,
    max_page_items: Option<u64>,
    returned: usize,
) -> bool {
    if returned == 0 {
        return false;
    }
    match (total_items, max_page_items) {
        (Some(total), Some(per_page)) if per_page > 0 => u64::from(page) * per_page < total,
        _ => true,
    }
}

fn snippet(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.len() > LIMIT {
        let mut end = LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} bytes total)", &text[..end], text.len())
    } else {
        text.to_string()
    }
}
