/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Post tree: roots, replies and repost copies.
//!
//! A repost copy always stores the id of a root in `original_root_id`; the
//! pointer is resolved before it is written, so for well-formed data root
//! resolution is a single lookup. Replies are attached to the canonical root
//! as well, so copies never gain replies of their own.

use crate::deletion::cascade_delete;
use crate::error::{FeedError, Result};
use crate::interaction::{refresh_counts, sync_copies};
use crate::social_db::{
    ensure_user, load_post, now_ms, query_posts, require_post, CollectionPage, Post, SocialDb, POST_COLS,
};
use rusqlite::{params, params_from_iter, Connection};
use tracing::{info, warn};

const MAX_ROOT_HOPS: usize = 8;

/// Returns the canonical root of `post` (the post itself unless it is a repost copy).
///
/// Writes keep every copy pointing straight at a root, so this normally costs
/// one lookup. The hop loop is a bounded repair path for stored data that
/// breaks that rule:
/// - a pointer to a missing post, to the post itself, or one that never
///   settles is cleared and the post becomes a root;
/// - a pointer to another copy is rewritten to that copy's root, and the
///   copy's owner is counted as a reposter there.
///
/// Every repair is logged.
pub(crate) fn resolve_root(conn: &Connection, post: Post) -> Result<Post> {
    let mut post = post;
    let mut chained = false;
    for _ in 0..MAX_ROOT_HOPS {
        let Some(root_id) = post.original_root_id else { return Ok(post) };
        let target = if root_id == post.id { None } else { load_post(conn, root_id)? };
        let Some(target) = target else {
            warn!(post_id = post.id, root_id, "repost copy points at a missing root or itself; treating it as a root");
            return detach_root_pointer(conn, post);
        };
        match target.original_root_id {
            None if chained => return adopt_chained_copy(conn, &post, target),
            None => return Ok(target),
            Some(next) => {
                warn!(post_id = post.id, via = root_id, root_id = next, "chained repost pointer");
                post.original_root_id = Some(next);
                chained = true;
            }
        }
    }
    warn!(post_id = post.id, "repost pointer does not settle; treating post as a root");
    detach_root_pointer(conn, post)
}

fn detach_root_pointer(conn: &Connection, mut post: Post) -> Result<Post> {
    conn.execute("UPDATE posts SET original_root_id=NULL WHERE id=?1", params![post.id])?;
    post.original_root_id = None;
    Ok(post)
}

/// Points `copy` straight at `root` and brings the root's engagement in line.
/// A chained copy whose owner already has a copy of `root` is removed instead.
fn adopt_chained_copy(conn: &Connection, copy: &Post, root: Post) -> Result<Post> {
    if repost_copy_ids(conn, copy.author_id, root.id)?.is_empty() {
        conn.execute(
            "UPDATE posts SET original_root_id=?2 WHERE id=?1",
            params![copy.id, root.id],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO post_reposts(post_id, user_id) VALUES (?1, ?2)",
            params![root.id, copy.author_id],
        )?;
    } else {
        warn!(post_id = copy.id, author_id = copy.author_id, root_id = root.id, "chained copy duplicates an existing repost; removing it");
        cascade_delete(conn, copy)?;
    }
    refresh_counts(conn, root.id)?;
    sync_copies(conn, root.id)?;
    require_post(conn, root.id)
}

/// Repost copies of `root_id`, oldest first.
pub(crate) fn reposts_of(conn: &Connection, root_id: i64) -> Result<Vec<Post>> {
    query_posts(
        conn,
        &format!("SELECT {POST_COLS} FROM posts WHERE original_root_id=?1 AND id<>?1 ORDER BY id ASC"),
        params![root_id],
    )
}

pub(crate) fn repost_copy_ids(conn: &Connection, user_id: i64, root_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM posts WHERE author_id=?1 AND original_root_id=?2 AND id<>?2 ORDER BY id ASC")?;
    let rows = stmt.query_map(params![user_id, root_id], |r| r.get::<_, i64>(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(crate) fn insert_post(
    conn: &Connection,
    author_id: i64,
    content: &str,
    image_ref: Option<&str>,
    parent_id: Option<i64>,
    original_root_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO posts(author_id, content, image_ref, parent_id, original_root_id, created_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![author_id, content, image_ref, parent_id, original_root_id, now_ms()],
    )?;
    Ok(conn.last_insert_rowid())
}

struct PostQuery {
    filter: &'static str,
    args: Vec<i64>,
}

/// Newest-first page over posts matching `q`. Ids are allocated in creation
/// order, so the id doubles as the cursor.
fn post_page(conn: &Connection, q: &PostQuery, limit: u32, cursor: Option<i64>) -> Result<CollectionPage<Post>> {
    let total: u64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM posts WHERE {}", q.filter),
        params_from_iter(q.args.iter()),
        |r| r.get(0),
    )?;
    let n = q.args.len();
    let sql = format!(
        "SELECT {POST_COLS} FROM posts WHERE ({}) AND id < ?{} ORDER BY id DESC LIMIT ?{}",
        q.filter,
        n + 1,
        n + 2
    );
    let mut args = q.args.clone();
    args.push(cursor.unwrap_or(i64::MAX));
    args.push(limit as i64);
    let items = query_posts(conn, &sql, params_from_iter(args.iter()))?;
    let next = if items.len() as u32 == limit {
        items.last().map(|p| p.id.to_string())
    } else {
        None
    };
    Ok(CollectionPage { total, items, next })
}

impl SocialDb {
    pub fn create_post(
        &self,
        author_id: i64,
        content: &str,
        image_ref: Option<&str>,
        parent_id: Option<i64>,
    ) -> Result<Post> {
        let content = content.trim();
        let image_ref = image_ref.map(str::trim).filter(|s| !s.is_empty());
        if content.is_empty() && image_ref.is_none() {
            return Err(FeedError::validation("post has neither content nor image"));
        }
        let post = self.write(|tx| {
            ensure_user(tx, author_id)?;
            let parent = match parent_id {
                Some(pid) => Some(resolve_root(tx, require_post(tx, pid)?)?.id),
                None => None,
            };
            let id = insert_post(tx, author_id, content, image_ref, parent, None)?;
            if let Some(pid) = parent {
                tx.execute("UPDATE posts SET reply_count = reply_count + 1 WHERE id=?1", params![pid])?;
            }
            require_post(tx, id)
        })?;
        info!(post_id = post.id, author_id, parent_id = ?post.parent_id, "post created");
        Ok(post)
    }

    pub fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        self.read(|conn| load_post(conn, post_id))
    }

    /// Canonical root for `post_id`. Runs as a write so pointer repairs persist.
    pub fn resolve_root(&self, post_id: i64) -> Result<Post> {
        self.write(|tx| resolve_root(tx, require_post(tx, post_id)?))
    }

    pub fn reposts_of(&self, root_id: i64) -> Result<Vec<Post>> {
        self.read(|conn| reposts_of(conn, root_id))
    }

    /// Direct replies, newest first. Asking for a repost copy lists its root's replies.
    pub fn replies_of(&self, post_id: i64, limit: u32, cursor: Option<i64>) -> Result<CollectionPage<Post>> {
        let limit = self.page_limit(limit);
        self.read(|conn| {
            let post = require_post(conn, post_id)?;
            let anchor = post.original_root_id.unwrap_or(post.id);
            post_page(conn, &PostQuery { filter: "parent_id=?1", args: vec![anchor] }, limit, cursor)
        })
    }

    /// Every non-reply post (roots and repost copies).
    pub fn list_feed(&self, limit: u32, cursor: Option<i64>) -> Result<CollectionPage<Post>> {
        let limit = self.page_limit(limit);
        self.read(|conn| post_page(conn, &PostQuery { filter: "parent_id IS NULL", args: vec![] }, limit, cursor))
    }

    /// Non-reply posts by the viewer and by everyone the viewer follows.
    pub fn list_home_feed(&self, viewer_id: i64, limit: u32, cursor: Option<i64>) -> Result<CollectionPage<Post>> {
        let limit = self.page_limit(limit);
        self.read(|conn| {
            ensure_user(conn, viewer_id)?;
            let q = PostQuery {
                filter: "parent_id IS NULL AND (author_id=?1 OR author_id IN (SELECT target_id FROM follows WHERE follower_id=?1))",
                args: vec![viewer_id],
            };
            post_page(conn, &q, limit, cursor)
        })
    }

    pub fn list_user_threads(&self, user_id: i64, limit: u32, cursor: Option<i64>) -> Result<CollectionPage<Post>> {
        self.user_page(user_id, "author_id=?1 AND parent_id IS NULL", limit, cursor)
    }

    pub fn list_user_replies(&self, user_id: i64, limit: u32, cursor: Option<i64>) -> Result<CollectionPage<Post>> {
        self.user_page(user_id, "author_id=?1 AND parent_id IS NOT NULL", limit, cursor)
    }

    pub fn list_user_reposts(&self, user_id: i64, limit: u32, cursor: Option<i64>) -> Result<CollectionPage<Post>> {
        self.user_page(user_id, "author_id=?1 AND original_root_id IS NOT NULL", limit, cursor)
    }

    fn user_page(
        &self,
        user_id: i64,
        filter: &'static str,
        limit: u32,
        cursor: Option<i64>,
    ) -> Result<CollectionPage<Post>> {
        let limit = self.page_limit(limit);
        self.read(|conn| {
            ensure_user(conn, user_id)?;
            post_page(conn, &PostQuery { filter, args: vec![user_id] }, limit, cursor)
        })
    }
}
