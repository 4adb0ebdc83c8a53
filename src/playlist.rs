// SPDX-License-Identifier: MIT

//! M3U serialization. The playlist is rendered fully in memory and written
//! with a single call, so an interrupted run never leaves a partial file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

use crate::portal::ResolvedEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub total: usize,
    pub written: usize,
    pub skipped: usize,
}

/// Serializes the resolved entries into M3U text. Entries that failed
/// resolution produce no lines and are tallied in the summary instead of
/// being silently dropped.
pub fn render(entries: &[ResolvedEntry]) -> (String, WriteSummary) {
    let mut out = String::from("#EXTM3U\n");
    let mut written = 0;
    let mut skipped = 0;

    for resolved in entries {
        let Some(url) = resolved.url() else {
            skipped += 1;
            continue;
        };
        out.push_str(&extinf_line(resolved));
        out.push('\n');
        out.push_str(url);
        out.push('\n');
        written += 1;
    }

    let summary = WriteSummary {
        total: entries.len(),
        written,
        skipped,
    };
    (out, summary)
}

pub fn write<P: AsRef<Path>>(path: P, entries: &[ResolvedEntry]) -> Result<WriteSummary> {
    let (text, summary) = render(entries);
    fs::write(&path, text)
        .with_context(|| format!("Failed to write playlist: {}", path.as_ref().display()))?;
    Ok(summary)
}

fn extinf_line(resolved: &ResolvedEntry) -> String {
    let entry = &resolved.entry;
    let logo = entry.logo.as_deref().unwrap_or("");

    match &entry.episode {
        Some(episode) => format!(
            "#EXTINF:-1 tvg-type=\"serie\" tvg-serie=\"{}\" tvg-season=\"{}\" \
             tvg-episode=\"{}\" serie-title=\"{}\" tvg-logo=\"{}\" group-title=\"{}\",{} S{} E{:02}",
            episode.series_id,
            episode.season,
            episode.episode,
            entry.name,
            logo,
            entry.category_title,
            entry.name,
            episode.season,
            episode.episode,
        ),
        None => format!(
            "#EXTINF:-1 tvg-logo=\"{}\" group-title=\"{}\",{}",
            logo, entry.category_title, entry.name
        ),
    }
}

/// Default output name: sanitized portal URL plus a timestamp, mirroring the
/// file names the portal dump traditionally produced.
pub fn default_output_name(base_url: &str) -> String {
    let sanitized = base_url.replace("://", "_").replace(['/', '.', ':'], "_");
    format!(
        "{}_{}.m3u",
        sanitized,
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    )
}
