/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use thiserror::Error;

/// Failures returned to callers of the engine.
///
/// Integrity problems found in stored data (dangling repost roots, duplicate
/// repost copies) never show up here: they are repaired where they are found
/// and logged.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid request: {0}")]
    Validation(String),

    /// The transaction was rolled back; nothing from the operation persisted.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl FeedError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        FeedError::NotFound { kind, id: id.to_string() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        FeedError::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FeedError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
