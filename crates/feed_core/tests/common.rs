/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use feed_core::{Post, SocialDb};
use rusqlite::Connection;

pub fn create_temp_db(name: &str) -> (tempfile::TempDir, PathBuf, SocialDb) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let db = SocialDb::open(&path).expect("open feed db");
    (dir, path, db)
}

/// Plain connection without foreign key enforcement, for corrupting data on purpose.
pub fn open_raw(path: &Path) -> Connection {
    let conn = Connection::open(path).expect("open raw connection");
    conn.execute_batch("PRAGMA foreign_keys=OFF;").expect("disable foreign keys");
    conn
}

pub fn create_users(db: &SocialDb, names: &[&str]) -> Vec<i64> {
    names
        .iter()
        .map(|n| db.create_user(n, None).expect("create user").id)
        .collect()
}

pub fn post(db: &SocialDb, id: i64) -> Post {
    db.get_post(id).expect("load post").expect("post exists")
}

pub fn assert_counters_match(p: &Post) {
    assert_eq!(p.like_count as usize, p.liked_by.len(), "like counter of post {}", p.id);
    assert_eq!(p.repost_count as usize, p.reposted_by.len(), "repost counter of post {}", p.id);
}

pub fn assert_copies_in_sync(db: &SocialDb, root_id: i64) {
    let root = post(db, root_id);
    assert_eq!(root.original_root_id, None);
    assert_counters_match(&root);
    for copy in db.reposts_of(root_id).expect("list copies") {
        assert_eq!(copy.liked_by, root.liked_by, "likedBy of copy {}", copy.id);
        assert_eq!(copy.reposted_by, root.reposted_by, "repostedBy of copy {}", copy.id);
        assert_eq!(copy.like_count, root.like_count, "likeCount of copy {}", copy.id);
        assert_eq!(copy.repost_count, root.repost_count, "repostCount of copy {}", copy.id);
    }
}

pub fn count(conn: &Connection, sql: &str, id: i64) -> i64 {
    conn.query_row(sql, [id], |r| r.get(0)).expect("count query")
}
