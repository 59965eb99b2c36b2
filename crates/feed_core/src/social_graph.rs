/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::Result;
use crate::social_db::{ensure_user, load_user, now_ms, CollectionPage, SocialDb, User};
use rusqlite::{params, Connection, OptionalExtension};

pub(crate) fn is_following(conn: &Connection, follower_id: i64, target_id: i64) -> Result<bool> {
    let row: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM follows WHERE follower_id=?1 AND target_id=?2",
            params![follower_id, target_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(row.is_some())
}

pub(crate) fn add_follow(conn: &Connection, follower_id: i64, target_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO follows(follower_id, target_id, created_at_ms) VALUES (?1, ?2, ?3)",
        params![follower_id, target_id, now_ms()],
    )?;
    Ok(())
}

pub(crate) fn remove_follow(conn: &Connection, follower_id: i64, target_id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM follows WHERE follower_id=?1 AND target_id=?2",
        params![follower_id, target_id],
    )?;
    Ok(())
}

enum Side {
    Following,
    Followers,
}

impl SocialDb {
    pub fn is_following(&self, follower_id: i64, target_id: i64) -> Result<bool> {
        self.read(|conn| is_following(conn, follower_id, target_id))
    }

    /// Users `user_id` follows, ordered by id. `cursor` is the last id of the previous page.
    pub fn following_of(&self, user_id: i64, limit: u32, cursor: Option<i64>) -> Result<CollectionPage<User>> {
        self.edge_page(user_id, Side::Following, limit, cursor)
    }

    pub fn followers_of(&self, user_id: i64, limit: u32, cursor: Option<i64>) -> Result<CollectionPage<User>> {
        self.edge_page(user_id, Side::Followers, limit, cursor)
    }

    fn edge_page(&self, user_id: i64, side: Side, limit: u32, cursor: Option<i64>) -> Result<CollectionPage<User>> {
        let limit = self.page_limit(limit);
        let (key, other) = match side {
            Side::Following => ("follower_id", "target_id"),
            Side::Followers => ("target_id", "follower_id"),
        };
        self.read(|conn| {
            ensure_user(conn, user_id)?;
            let total: u64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM follows WHERE {key}=?1"),
                params![user_id],
                |r| r.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {other} FROM follows WHERE {key}=?1 AND {other} > ?2 ORDER BY {other} ASC LIMIT ?3"
            ))?;
            let ids = stmt
                .query_map(params![user_id, cursor.unwrap_or(i64::MIN), limit], |r| r.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let mut items = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(u) = load_user(conn, id)? {
                    items.push(u);
                }
            }
            let next = if items.len() as u32 == limit {
                items.last().map(|u| u.id.to_string())
            } else {
                None
            };
            Ok(CollectionPage { total, items, next })
        })
    }
}
