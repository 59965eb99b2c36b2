/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod config;
pub mod deletion;
pub mod error;
pub mod interaction;
pub mod messaging;
pub mod notifications;
pub mod post_graph;
pub mod social_db;
pub mod social_graph;

pub use config::{load_config, FeedConfig};
pub use deletion::CascadeStats;
pub use error::{FeedError, Result};
pub use interaction::{LikeOutcome, RepostOutcome};
pub use social_db::{Activity, CollectionPage, Message, Post, PostRole, SocialDb, User};

pub fn feed_core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
