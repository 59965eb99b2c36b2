/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FeedConfig {
    pub db_path: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    /// Upper bound for every paged listing.
    pub max_page_limit: Option<u32>,
    /// Body of the chat message created when a post is shared.
    pub share_message_text: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            db_path: Some("feed.sqlite".to_string()),
            busy_timeout_ms: Some(5_000),
            max_page_limit: Some(200),
            share_message_text: Some("Shared a post with you".to_string()),
        }
    }
}

impl FeedConfig {
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(
            self.db_path
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("feed.sqlite"),
        )
    }

    pub fn busy_timeout_ms(&self) -> u64 {
        self.busy_timeout_ms.unwrap_or(5_000).min(60_000)
    }

    pub fn max_page_limit(&self) -> u32 {
        self.max_page_limit.unwrap_or(200).clamp(1, 1_000)
    }

    pub fn share_message_text(&self) -> &str {
        self.share_message_text
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Shared a post with you")
    }

    /// Missing keys fall back to the defaults. `FEED_DB` overrides the database path.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut cfg: FeedConfig = serde_json::from_str(text).context("parse feed config")?;
        let defaults = FeedConfig::default();
        cfg.db_path = cfg.db_path.or(defaults.db_path);
        cfg.busy_timeout_ms = cfg.busy_timeout_ms.or(defaults.busy_timeout_ms);
        cfg.max_page_limit = cfg.max_page_limit.or(defaults.max_page_limit);
        cfg.share_message_text = cfg.share_message_text.or(defaults.share_message_text);
        if let Ok(v) = std::env::var("FEED_DB") {
            if !v.trim().is_empty() {
                info!("FEED_DB set, using {v}");
                cfg.db_path = Some(v);
            }
        }
        Ok(cfg)
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<FeedConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
    FeedConfig::from_json(&text)
}
