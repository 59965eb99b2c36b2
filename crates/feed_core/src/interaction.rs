/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Like, repost and follow toggles.
//!
//! Each toggle runs in one immediate transaction: membership change, counter
//! recount, copy synchronisation and notification commit together or not at
//! all. Counters are recomputed from the membership tables rather than
//! incremented, so they always equal the set sizes.

use crate::deletion::cascade_delete;
use crate::error::{FeedError, Result};
use crate::notifications::emit;
use crate::post_graph::{insert_post, repost_copy_ids, resolve_root};
use crate::social_db::{ensure_user, require_post, Post, SocialDb};
use crate::social_graph::{add_follow, is_following, remove_follow};
use feed_protocol::{ActivityType, FollowResponse, LikeAction, RepostAction, RepostResponse};
use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, serde::Serialize)]
pub struct LikeOutcome {
    pub post: Post,
    pub action: LikeAction,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RepostOutcome {
    pub root: Post,
    pub action: RepostAction,
    pub copy_id: Option<i64>,
}

impl RepostOutcome {
    pub fn response(&self) -> RepostResponse {
        RepostResponse {
            action: self.action,
            root_id: self.root.id,
            copy_id: self.copy_id,
        }
    }
}

pub(crate) fn refresh_counts(conn: &Connection, post_id: i64) -> Result<()> {
    conn.execute(
        r#"
        UPDATE posts SET
          like_count=(SELECT COUNT(*) FROM post_likes WHERE post_id=?1),
          repost_count=(SELECT COUNT(*) FROM post_reposts WHERE post_id=?1)
        WHERE id=?1
        "#,
        params![post_id],
    )?;
    Ok(())
}

/// Overwrites the engagement state of every repost copy of `root_id` with the
/// root's: both membership sets and both counters. Returns the number of copies.
pub(crate) fn sync_copies(conn: &Connection, root_id: i64) -> Result<usize> {
    for table in ["post_likes", "post_reposts"] {
        conn.execute(
            &format!("DELETE FROM {table} WHERE post_id IN (SELECT id FROM posts WHERE original_root_id=?1 AND id<>?1)"),
            params![root_id],
        )?;
        conn.execute(
            &format!(
                r#"
                INSERT INTO {table}(post_id, user_id)
                SELECT c.id, m.user_id
                FROM posts c JOIN {table} m ON m.post_id=?1
                WHERE c.original_root_id=?1 AND c.id<>?1
                "#
            ),
            params![root_id],
        )?;
    }
    let n = conn.execute(
        r#"
        UPDATE posts SET
          like_count=(SELECT r.like_count FROM posts r WHERE r.id=?1),
          repost_count=(SELECT r.repost_count FROM posts r WHERE r.id=?1)
        WHERE original_root_id=?1 AND id<>?1
        "#,
        params![root_id],
    )?;
    if n > 0 {
        debug!(root_id, copies = n, "repost copies synchronised");
    }
    Ok(n)
}

impl SocialDb {
    /// Likes always land on the canonical root, whichever copy was clicked.
    pub fn toggle_like(&self, user_id: i64, post_id: i64) -> Result<LikeOutcome> {
        let outcome = self.write(|tx| {
            ensure_user(tx, user_id)?;
            let root = resolve_root(tx, require_post(tx, post_id)?)?;
            let action = if root.is_liked_by(user_id) {
                tx.execute(
                    "DELETE FROM post_likes WHERE post_id=?1 AND user_id=?2",
                    params![root.id, user_id],
                )?;
                LikeAction::Unliked
            } else {
                tx.execute(
                    "INSERT OR IGNORE INTO post_likes(post_id, user_id) VALUES (?1, ?2)",
                    params![root.id, user_id],
                )?;
                emit(tx, ActivityType::Like, user_id, root.author_id, Some(root.id))?;
                LikeAction::Liked
            };
            refresh_counts(tx, root.id)?;
            sync_copies(tx, root.id)?;
            Ok(LikeOutcome { post: require_post(tx, root.id)?, action })
        })?;
        info!(user_id, post_id, root_id = outcome.post.id, action = ?outcome.action, "like toggled");
        Ok(outcome)
    }

    /// Creates or removes `user_id`'s repost copy of the canonical root.
    pub fn toggle_repost(&self, user_id: i64, post_id: i64) -> Result<RepostOutcome> {
        let outcome = self.write(|tx| {
            ensure_user(tx, user_id)?;
            let root = resolve_root(tx, require_post(tx, post_id)?)?;
            let existing = repost_copy_ids(tx, user_id, root.id)?;
            let member = root.is_reposted_by(user_id);

            if member || !existing.is_empty() {
                if member == existing.is_empty() {
                    warn!(user_id, root_id = root.id, member, copies = existing.len(), "repost membership and copies disagree");
                }
                if existing.len() > 1 {
                    warn!(user_id, root_id = root.id, copies = existing.len(), "multiple repost copies; removing all");
                }
                tx.execute(
                    "DELETE FROM post_reposts WHERE post_id=?1 AND user_id=?2",
                    params![root.id, user_id],
                )?;
                for id in existing {
                    let copy = require_post(tx, id)?;
                    cascade_delete(tx, &copy)?;
                }
                refresh_counts(tx, root.id)?;
                sync_copies(tx, root.id)?;
                return Ok(RepostOutcome {
                    root: require_post(tx, root.id)?,
                    action: RepostAction::Deleted,
                    copy_id: None,
                });
            }

            tx.execute(
                "INSERT INTO post_reposts(post_id, user_id) VALUES (?1, ?2)",
                params![root.id, user_id],
            )?;
            refresh_counts(tx, root.id)?;
            let copy_id = insert_post(tx, user_id, &root.content, root.image_ref.as_deref(), None, Some(root.id))?;
            // Seeds the new copy together with the existing ones.
            sync_copies(tx, root.id)?;
            emit(tx, ActivityType::Repost, user_id, root.author_id, Some(root.id))?;
            Ok(RepostOutcome {
                root: require_post(tx, root.id)?,
                action: RepostAction::Created,
                copy_id: Some(copy_id),
            })
        })?;
        info!(user_id, post_id, root_id = outcome.root.id, action = ?outcome.action, "repost toggled");
        Ok(outcome)
    }

    pub fn toggle_follow(&self, follower_id: i64, target_id: i64) -> Result<FollowResponse> {
        if follower_id == target_id {
            return Err(FeedError::validation("users cannot follow themselves"));
        }
        let following = self.write(|tx| {
            ensure_user(tx, follower_id)?;
            ensure_user(tx, target_id)?;
            if is_following(tx, follower_id, target_id)? {
                remove_follow(tx, follower_id, target_id)?;
                Ok(false)
            } else {
                add_follow(tx, follower_id, target_id)?;
                emit(tx, ActivityType::Follow, follower_id, target_id, None)?;
                Ok(true)
            }
        })?;
        info!(follower_id, target_id, following, "follow toggled");
        Ok(FollowResponse { following })
    }
}
