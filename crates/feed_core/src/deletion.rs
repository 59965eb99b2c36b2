/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Post removal.
//!
//! A deleted post takes its whole subtree with it: repost copies and replies,
//! at any depth. The subtree is collected breadth-first into a worklist and
//! then removed leaves first, so every post is gone before the post it points
//! at. For each post: notifications, engagement, shared messages, parent
//! counter, then the row itself. Foreign keys are enforced, so a reference
//! the cascade missed fails the statement and the whole transaction rolls
//! back.

use crate::error::Result;
use crate::interaction::{refresh_counts, sync_copies};
use crate::messaging::detach_shared_post;
use crate::notifications::purge_for_post;
use crate::social_db::{load_post, require_post, Post, SocialDb};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CascadeStats {
    pub posts_deleted: usize,
    pub activities_purged: usize,
    pub messages_detached: usize,
}

/// `(id, parent_id)` of `post` and everything hanging off it, parents before children.
fn collect_subtree(conn: &Connection, post: &Post) -> Result<Vec<(i64, Option<i64>)>> {
    let mut stmt = conn.prepare(
        "SELECT id, parent_id FROM posts WHERE (parent_id=?1 OR original_root_id=?1) AND id<>?1 ORDER BY id ASC",
    )?;
    let mut seen = HashSet::from([post.id]);
    let mut order = vec![(post.id, post.parent_id)];
    let mut cursor = 0;
    while cursor < order.len() {
        let id = order[cursor].0;
        cursor += 1;
        let rows = stmt.query_map(params![id], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Option<i64>>(1)?)))?;
        for row in rows {
            let (child, parent_id) = row?;
            if seen.insert(child) {
                order.push((child, parent_id));
            }
        }
    }
    Ok(order)
}

pub(crate) fn cascade_delete(conn: &Connection, post: &Post) -> Result<CascadeStats> {
    let mut stats = CascadeStats::default();
    for (id, parent_id) in collect_subtree(conn, post)?.into_iter().rev() {
        stats.activities_purged += purge_for_post(conn, id)?;
        conn.execute("DELETE FROM post_likes WHERE post_id=?1", params![id])?;
        conn.execute("DELETE FROM post_reposts WHERE post_id=?1", params![id])?;
        stats.messages_detached += detach_shared_post(conn, id)?;
        if let Some(parent_id) = parent_id {
            conn.execute(
                "UPDATE posts SET reply_count = MAX(reply_count - 1, 0) WHERE id=?1",
                params![parent_id],
            )?;
        }
        conn.execute("DELETE FROM posts WHERE id=?1", params![id])?;
        stats.posts_deleted += 1;
    }
    Ok(stats)
}

impl SocialDb {
    /// Removes a post and everything that references it, atomically.
    ///
    /// Deleting a repost copy directly also withdraws its author's repost of the
    /// root and re-synchronises the remaining copies.
    pub fn delete_post(&self, post_id: i64) -> Result<CascadeStats> {
        let stats = self.write(|tx| {
            let post = require_post(tx, post_id)?;
            let stats = cascade_delete(tx, &post)?;
            if let Some(root_id) = post.original_root_id {
                if load_post(tx, root_id)?.is_some() {
                    tx.execute(
                        "DELETE FROM post_reposts WHERE post_id=?1 AND user_id=?2",
                        params![root_id, post.author_id],
                    )?;
                    refresh_counts(tx, root_id)?;
                    sync_copies(tx, root_id)?;
                }
            }
            Ok(stats)
        })?;
        info!(
            post_id,
            posts = stats.posts_deleted,
            activities = stats.activities_purged,
            messages = stats.messages_detached,
            "post deleted"
        );
        Ok(stats)
    }
}
