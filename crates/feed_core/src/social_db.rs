/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::interaction::{refresh_counts, sync_copies};
use feed_protocol::ActivityType;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub struct SocialDb {
    path: PathBuf,
    busy_timeout: Duration,
    max_page_limit: u32,
    share_message_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_ref: Option<String>,
    pub created_at_ms: i64,
    pub following_count: u64,
    pub followers_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostRole {
    Root,
    Reply,
    RepostCopy,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub content: String,
    pub image_ref: Option<String>,
    pub like_count: u64,
    pub reply_count: u64,
    pub repost_count: u64,
    pub parent_id: Option<i64>,
    pub original_root_id: Option<i64>,
    /// Sorted user ids.
    pub liked_by: Vec<i64>,
    /// Sorted user ids.
    pub reposted_by: Vec<i64>,
    pub created_at_ms: i64,
}

impl Post {
    pub fn role(&self) -> PostRole {
        if self.original_root_id.is_some() {
            PostRole::RepostCopy
        } else if self.parent_id.is_some() {
            PostRole::Reply
        } else {
            PostRole::Root
        }
    }

    pub fn is_liked_by(&self, user_id: i64) -> bool {
        self.liked_by.binary_search(&user_id).is_ok()
    }

    pub fn is_reposted_by(&self, user_id: i64) -> bool {
        self.reposted_by.binary_search(&user_id).is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Activity {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub actor_id: i64,
    pub recipient_id: i64,
    pub post_id: Option<i64>,
    pub created_at_ms: i64,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub content: String,
    pub shared_post_id: Option<i64>,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectionPage<T> {
    pub total: u64,
    pub items: Vec<T>,
    pub next: Option<String>,
}

impl SocialDb {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let cfg = FeedConfig {
            db_path: Some(db_path.as_ref().to_string_lossy().into_owned()),
            ..FeedConfig::default()
        };
        Self::open_with_config(&cfg)
    }

    pub fn open_with_config(cfg: &FeedConfig) -> Result<Self> {
        let db = Self {
            path: cfg.db_path(),
            busy_timeout: Duration::from_millis(cfg.busy_timeout_ms()),
            max_page_limit: cfg.max_page_limit(),
            share_message_text: cfg.share_message_text().to_string(),
        };
        let conn = db.conn()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS users (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              username TEXT NOT NULL UNIQUE,
              display_name TEXT NULL,
              created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS posts (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              author_id INTEGER NOT NULL REFERENCES users(id),
              content TEXT NOT NULL,
              image_ref TEXT NULL,
              like_count INTEGER NOT NULL DEFAULT 0,
              reply_count INTEGER NOT NULL DEFAULT 0,
              repost_count INTEGER NOT NULL DEFAULT 0,
              parent_id INTEGER NULL REFERENCES posts(id),
              original_root_id INTEGER NULL REFERENCES posts(id),
              created_at_ms INTEGER NOT NULL,
              CHECK (parent_id IS NULL OR original_root_id IS NULL)
            );
            CREATE INDEX IF NOT EXISTS idx_posts_parent ON posts(parent_id, id DESC);
            CREATE INDEX IF NOT EXISTS idx_posts_root ON posts(original_root_id);
            CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id, id DESC);

            CREATE TABLE IF NOT EXISTS post_likes (
              post_id INTEGER NOT NULL REFERENCES posts(id),
              user_id INTEGER NOT NULL REFERENCES users(id),
              PRIMARY KEY(post_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS post_reposts (
              post_id INTEGER NOT NULL REFERENCES posts(id),
              user_id INTEGER NOT NULL REFERENCES users(id),
              PRIMARY KEY(post_id, user_id)
            );

            -- One directed edge per follow; "following" and "followers" are both views of it.
            CREATE TABLE IF NOT EXISTS follows (
              follower_id INTEGER NOT NULL REFERENCES users(id),
              target_id INTEGER NOT NULL REFERENCES users(id),
              created_at_ms INTEGER NOT NULL,
              PRIMARY KEY(follower_id, target_id),
              CHECK (follower_id <> target_id)
            );
            CREATE INDEX IF NOT EXISTS idx_follows_target ON follows(target_id);

            CREATE TABLE IF NOT EXISTS activities (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              type TEXT NOT NULL,
              actor_id INTEGER NOT NULL REFERENCES users(id),
              recipient_id INTEGER NOT NULL REFERENCES users(id),
              post_id INTEGER NULL REFERENCES posts(id),
              created_at_ms INTEGER NOT NULL,
              is_read INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_activities_recipient ON activities(recipient_id, id DESC);
            CREATE INDEX IF NOT EXISTS idx_activities_post ON activities(post_id);

            CREATE TABLE IF NOT EXISTS messages (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              sender_id INTEGER NOT NULL REFERENCES users(id),
              recipient_id INTEGER NOT NULL REFERENCES users(id),
              content TEXT NOT NULL,
              shared_post_id INTEGER NULL REFERENCES posts(id),
              created_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages(sender_id, recipient_id);
            CREATE INDEX IF NOT EXISTS idx_messages_shared ON messages(shared_post_id);
            "#,
        )?;
        ensure_columns(&conn, "users", &[
            ("bio", "TEXT NULL"),
            ("avatar_ref", "TEXT NULL"),
        ])?;
        drop(conn);

        db.write(|tx| {
            // Repairs may briefly create duplicate (author, root) copies.
            if has_broken_repost_pointers(tx)? {
                tx.execute_batch("DROP INDEX IF EXISTS idx_posts_repost_owner;")?;
            }
            let rewritten = repair_repost_chains(tx)?;
            collapse_duplicate_reposts(tx)?;
            reconcile_rewritten_copies(tx, &rewritten)?;
            tx.execute_batch(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_posts_repost_owner
                 ON posts(author_id, original_root_id) WHERE original_root_id IS NOT NULL;",
            )?;
            Ok(())
        })?;
        info!("feed db ready: {}", db.path.display());
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn share_message_text(&self) -> &str {
        &self.share_message_text
    }

    pub fn health_check(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(conn)
    }

    /// Runs `f` inside one immediate (write-locking) transaction. Any error
    /// drops the transaction, which rolls it back.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn()?;
        f(&conn)
    }

    pub(crate) fn page_limit(&self, limit: u32) -> u32 {
        limit.max(1).min(self.max_page_limit)
    }

    pub fn create_user(&self, username: &str, display_name: Option<&str>) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(FeedError::validation("username is empty"));
        }
        let display_name = display_name.map(str::trim).filter(|s| !s.is_empty());
        self.write(|tx| {
            if find_user_id_by_username(tx, username)?.is_some() {
                return Err(FeedError::validation(format!("username taken: {username}")));
            }
            tx.execute(
                "INSERT INTO users(username, display_name, created_at_ms) VALUES (?1, ?2, ?3)",
                params![username, display_name, now_ms()],
            )?;
            require_user(tx, tx.last_insert_rowid())
        })
    }

    pub fn find_user(&self, user_id: i64) -> Result<Option<User>> {
        self.read(|conn| load_user(conn, user_id))
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.trim();
        if username.is_empty() {
            return Ok(None);
        }
        self.read(|conn| match find_user_id_by_username(conn, username)? {
            Some(id) => load_user(conn, id),
            None => Ok(None),
        })
    }

    pub fn update_profile(&self, user_id: i64, display_name: Option<&str>, bio: Option<&str>) -> Result<User> {
        let display_name = display_name.map(str::trim).filter(|s| !s.is_empty());
        let bio = bio.map(str::trim).filter(|s| !s.is_empty());
        self.write(|tx| {
            let n = tx.execute(
                "UPDATE users SET display_name=?2, bio=?3 WHERE id=?1",
                params![user_id, display_name, bio],
            )?;
            if n == 0 {
                return Err(FeedError::not_found("user", user_id));
            }
            require_user(tx, user_id)
        })
    }

    pub fn set_avatar(&self, user_id: i64, avatar_ref: &str) -> Result<User> {
        let avatar_ref = avatar_ref.trim();
        if avatar_ref.is_empty() {
            return Err(FeedError::validation("avatar reference is empty"));
        }
        self.write(|tx| {
            let n = tx.execute("UPDATE users SET avatar_ref=?2 WHERE id=?1", params![user_id, avatar_ref])?;
            if n == 0 {
                return Err(FeedError::not_found("user", user_id));
            }
            require_user(tx, user_id)
        })
    }

    pub fn search_users(&self, q: &str, limit: u32) -> Result<Vec<User>> {
        let q = q.trim().to_lowercase();
        if q.is_empty() {
            return Ok(vec![]);
        }
        let pattern = format!("%{}%", escape_like(&q));
        let limit = self.page_limit(limit);
        self.read(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id FROM users
                WHERE lower(username) LIKE ?1 ESCAPE '\'
                   OR lower(COALESCE(display_name, '')) LIKE ?1 ESCAPE '\'
                ORDER BY username ASC
                LIMIT ?2
                "#,
            )?;
            let ids = stmt
                .query_map(params![pattern, limit], |r| r.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(u) = load_user(conn, id)? {
                    out.push(u);
                }
            }
            Ok(out)
        })
    }
}

const USER_COLS: &str = "id, username, display_name, bio, avatar_ref, created_at_ms";

pub(crate) fn load_user(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id=?1"),
            params![user_id],
            |r| {
                Ok(User {
                    id: r.get(0)?,
                    username: r.get(1)?,
                    display_name: r.get(2)?,
                    bio: r.get(3)?,
                    avatar_ref: r.get(4)?,
                    created_at_ms: r.get(5)?,
                    following_count: 0,
                    followers_count: 0,
                })
            },
        )
        .optional()?;
    let Some(mut user) = row else { return Ok(None) };
    user.following_count = conn.query_row(
        "SELECT COUNT(*) FROM follows WHERE follower_id=?1",
        params![user_id],
        |r| r.get(0),
    )?;
    user.followers_count = conn.query_row(
        "SELECT COUNT(*) FROM follows WHERE target_id=?1",
        params![user_id],
        |r| r.get(0),
    )?;
    Ok(Some(user))
}

pub(crate) fn require_user(conn: &Connection, user_id: i64) -> Result<User> {
    load_user(conn, user_id)?.ok_or_else(|| FeedError::not_found("user", user_id))
}

pub(crate) fn user_exists(conn: &Connection, user_id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM users WHERE id=?1", params![user_id], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn ensure_user(conn: &Connection, user_id: i64) -> Result<()> {
    if user_exists(conn, user_id)? {
        Ok(())
    } else {
        Err(FeedError::not_found("user", user_id))
    }
}

fn find_user_id_by_username(conn: &Connection, username: &str) -> Result<Option<i64>> {
    conn.query_row("SELECT id FROM users WHERE username=?1", params![username], |r| r.get(0))
        .optional()
        .map_err(Into::into)
}

pub(crate) const POST_COLS: &str =
    "id, author_id, content, image_ref, like_count, reply_count, repost_count, parent_id, original_root_id, created_at_ms";

/// Maps a row selected with [`POST_COLS`]; membership sets are filled by [`load_post`].
pub(crate) fn map_post_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: r.get(0)?,
        author_id: r.get(1)?,
        content: r.get(2)?,
        image_ref: r.get(3)?,
        like_count: r.get::<_, i64>(4)?.max(0) as u64,
        reply_count: r.get::<_, i64>(5)?.max(0) as u64,
        repost_count: r.get::<_, i64>(6)?.max(0) as u64,
        parent_id: r.get(7)?,
        original_root_id: r.get(8)?,
        liked_by: Vec::new(),
        reposted_by: Vec::new(),
        created_at_ms: r.get(9)?,
    })
}

pub(crate) fn load_post(conn: &Connection, post_id: i64) -> Result<Option<Post>> {
    let row = conn
        .query_row(
            &format!("SELECT {POST_COLS} FROM posts WHERE id=?1"),
            params![post_id],
            map_post_row,
        )
        .optional()?;
    let Some(mut post) = row else { return Ok(None) };
    fill_memberships(conn, &mut post)?;
    Ok(Some(post))
}

pub(crate) fn require_post(conn: &Connection, post_id: i64) -> Result<Post> {
    load_post(conn, post_id)?.ok_or_else(|| FeedError::not_found("post", post_id))
}

pub(crate) fn fill_memberships(conn: &Connection, post: &mut Post) -> Result<()> {
    post.liked_by = member_ids(conn, "post_likes", post.id)?;
    post.reposted_by = member_ids(conn, "post_reposts", post.id)?;
    Ok(())
}

/// Runs a `SELECT {POST_COLS} ...` query and loads each post with its memberships.
pub(crate) fn query_posts(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Post>> {
    let mut stmt = conn.prepare(sql)?;
    let mut posts = stmt
        .query_map(args, map_post_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for p in posts.iter_mut() {
        fill_memberships(conn, p)?;
    }
    Ok(posts)
}

fn member_ids(conn: &Connection, table: &str, post_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(&format!("SELECT user_id FROM {table} WHERE post_id=?1 ORDER BY user_id ASC"))?;
    let rows = stmt.query_map(params![post_id], |r| r.get::<_, i64>(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(crate) fn map_activity_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Activity> {
    let raw: String = r.get(1)?;
    let kind = ActivityType::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown activity type: {raw}").into(),
        )
    })?;
    Ok(Activity {
        id: r.get(0)?,
        kind,
        actor_id: r.get(2)?,
        recipient_id: r.get(3)?,
        post_id: r.get(4)?,
        created_at_ms: r.get(5)?,
        read: r.get::<_, i64>(6)? != 0,
    })
}

pub(crate) const ACTIVITY_COLS: &str = "id, type, actor_id, recipient_id, post_id, created_at_ms, is_read";

pub(crate) const MESSAGE_COLS: &str = "id, sender_id, recipient_id, content, shared_post_id, created_at_ms";

pub(crate) fn map_message_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: r.get(0)?,
        sender_id: r.get(1)?,
        recipient_id: r.get(2)?,
        content: r.get(3)?,
        shared_post_id: r.get(4)?,
        created_at_ms: r.get(5)?,
    })
}

/// Repost pointers that do not land directly on an existing root.
const BROKEN_REPOST_POINTERS: &str = r#"
    SELECT COUNT(*) FROM posts p
    WHERE p.original_root_id IS NOT NULL
      AND (p.original_root_id = p.id
           OR NOT EXISTS (SELECT 1 FROM posts r WHERE r.id = p.original_root_id AND r.original_root_id IS NULL))
"#;

const CHAINED_REPOST_POINTERS: &str =
    "SELECT id FROM posts WHERE original_root_id IN (SELECT id FROM posts WHERE original_root_id IS NOT NULL)";

fn has_broken_repost_pointers(conn: &Connection) -> Result<bool> {
    let n: i64 = conn.query_row(BROKEN_REPOST_POINTERS, [], |r| r.get(0))?;
    Ok(n > 0)
}

fn clear_self_pointers(conn: &Connection) -> Result<()> {
    let n = conn.execute("UPDATE posts SET original_root_id=NULL WHERE original_root_id=id", [])?;
    if n > 0 {
        warn!("cleared {n} self-referencing repost pointers");
    }
    Ok(())
}

/// Clears repost pointers to missing or self posts and rewrites pointers that
/// land on another repost copy so they point at that copy's root. Returns the
/// ids of rewritten posts. Bounded; anything still chained afterwards is part
/// of a cycle and gets cleared.
fn repair_repost_chains(conn: &Connection) -> Result<Vec<i64>> {
    let n = conn.execute(
        "UPDATE posts SET original_root_id=NULL
         WHERE original_root_id IS NOT NULL AND original_root_id NOT IN (SELECT id FROM posts)",
        [],
    )?;
    if n > 0 {
        warn!("cleared {n} dangling repost pointers");
    }

    let mut rewritten = Vec::new();
    for _ in 0..32 {
        clear_self_pointers(conn)?;
        let mut stmt = conn.prepare(CHAINED_REPOST_POINTERS)?;
        let ids = stmt
            .query_map([], |r| r.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        if ids.is_empty() {
            return Ok(rewritten);
        }
        conn.execute(
            r#"
            UPDATE posts
            SET original_root_id = (SELECT p2.original_root_id FROM posts p2 WHERE p2.id = posts.original_root_id)
            WHERE original_root_id IN (SELECT id FROM posts WHERE original_root_id IS NOT NULL)
            "#,
            [],
        )?;
        warn!("repaired {} chained repost pointers", ids.len());
        rewritten.extend(ids);
    }
    let n = conn.execute(
        &format!("UPDATE posts SET original_root_id=NULL WHERE id IN ({CHAINED_REPOST_POINTERS})"),
        [],
    )?;
    clear_self_pointers(conn)?;
    warn!("repost pointer repair did not converge; cleared {n} cyclic pointers");
    Ok(rewritten)
}

/// Counts the owners of rewritten copies as reposters of their new root and
/// re-synchronises those roots.
fn reconcile_rewritten_copies(conn: &Connection, ids: &[i64]) -> Result<()> {
    let mut roots = BTreeSet::new();
    for &id in ids {
        let Some(copy) = load_post(conn, id)? else { continue };
        let Some(root_id) = copy.original_root_id else { continue };
        conn.execute(
            "INSERT OR IGNORE INTO post_reposts(post_id, user_id) VALUES (?1, ?2)",
            params![root_id, copy.author_id],
        )?;
        roots.insert(root_id);
    }
    for root_id in roots {
        refresh_counts(conn, root_id)?;
        sync_copies(conn, root_id)?;
    }
    Ok(())
}

/// Keeps the oldest repost copy per (author, root) and cascades the rest away.
fn collapse_duplicate_reposts(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        r#"
        SELECT p.id FROM posts p
        WHERE p.original_root_id IS NOT NULL
          AND p.id > (
            SELECT MIN(q.id) FROM posts q
            WHERE q.author_id = p.author_id AND q.original_root_id = p.original_root_id
          )
        "#,
    )?;
    let extra = stmt
        .query_map([], |r| r.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);
    for id in extra {
        if let Some(copy) = load_post(conn, id)? {
            warn!(post_id = id, author_id = copy.author_id, "removing duplicate repost copy");
            crate::deletion::cascade_delete(conn, &copy)?;
        }
    }
    Ok(())
}

fn ensure_columns(conn: &Connection, table: &str, cols: &[(&str, &str)]) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut existing = std::collections::HashSet::new();
    for r in rows {
        existing.insert(r?);
    }
    for (name, ty) in cols {
        if !existing.contains(*name) {
            conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {name} {ty}"), [])?;
        }
    }
    Ok(())
}

fn escape_like(input: &str) -> String {
    input.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
