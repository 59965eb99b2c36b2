/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};

/// Kind of a notification row. Stored as its upper-case name.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Like,
    Repost,
    Follow,
    Message,
    Share,
}

impl ActivityType {
    pub const ALL: [ActivityType; 5] = [
        ActivityType::Like,
        ActivityType::Repost,
        ActivityType::Follow,
        ActivityType::Message,
        ActivityType::Share,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Like => "LIKE",
            ActivityType::Repost => "REPOST",
            ActivityType::Follow => "FOLLOW",
            ActivityType::Message => "MESSAGE",
            ActivityType::Share => "SHARE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|t| t.as_str().eq_ignore_ascii_case(s))
    }

    /// Sharing a post is a messaging action, so it is recorded even when the
    /// actor is also the recipient.
    pub fn notifies_self(self) -> bool {
        matches!(self, ActivityType::Share)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Liked,
    Unliked,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepostAction {
    Created,
    Deleted,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RepostResponse {
    pub action: RepostAction,
    pub root_id: i64,
    pub copy_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct FollowResponse {
    pub following: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MarkReadRequest {
    pub recipient_id: i64,
    #[serde(rename = "type")]
    pub kind: ActivityType,
}
