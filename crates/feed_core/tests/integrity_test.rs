/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

mod common;

use std::thread;

use common::{assert_copies_in_sync, count, create_temp_db, create_users, open_raw, post};
use feed_core::{FeedError, SocialDb};
use feed_protocol::RepostAction;
use rusqlite::params;

#[test]
fn dangling_root_pointer_is_cleared_on_resolve() {
    let (_dir, path, db) = create_temp_db("dangling.sqlite");
    let alice = create_users(&db, &["alice"])[0];
    let orphan = {
        let conn = open_raw(&path);
        conn.execute(
            "INSERT INTO posts(author_id, content, original_root_id, created_at_ms) VALUES (?1, 'lost', 9999, 0)",
            params![alice],
        )
        .unwrap();
        conn.last_insert_rowid()
    };

    let resolved = db.resolve_root(orphan).unwrap();
    assert_eq!(resolved.id, orphan);
    assert_eq!(resolved.original_root_id, None);
    assert_eq!(post(&db, orphan).original_root_id, None);

    // Once repaired it behaves like any other root.
    let bob = create_users(&db, &["bob"])[0];
    assert_eq!(db.toggle_like(bob, orphan).unwrap().post.like_count, 1);
}

#[test]
fn chained_copies_are_rewritten_on_open() {
    let (_dir, path, db) = create_temp_db("chains.sqlite");
    let ids = create_users(&db, &["alice", "bob", "carol"]);
    let root = db.create_post(ids[0], "root", None, None).unwrap();
    let bob_copy = db.toggle_repost(ids[1], root.id).unwrap().copy_id.unwrap();
    let chained = {
        let conn = open_raw(&path);
        conn.execute(
            "INSERT INTO posts(author_id, content, original_root_id, created_at_ms) VALUES (?1, 'root', ?2, 0)",
            params![ids[2], bob_copy],
        )
        .unwrap();
        conn.last_insert_rowid()
    };
    drop(db);

    let db = SocialDb::open(&path).unwrap();
    assert_eq!(post(&db, chained).original_root_id, Some(root.id));
    assert_eq!(db.reposts_of(root.id).unwrap().len(), 2);
    assert_eq!(post(&db, root.id).reposted_by, vec![ids[1], ids[2]]);
    assert_eq!(post(&db, chained).reposted_by, vec![ids[1], ids[2]]);
    assert_copies_in_sync(&db, root.id);
}

#[test]
fn self_pointer_is_cleared_on_open() {
    let (_dir, path, db) = create_temp_db("self_pointer.sqlite");
    let ids = create_users(&db, &["alice", "bob"]);
    let p = db.create_post(ids[0], "hello", None, None).unwrap();
    db.toggle_like(ids[1], p.id).unwrap();
    open_raw(&path)
        .execute("UPDATE posts SET original_root_id=id WHERE id=?1", params![p.id])
        .unwrap();
    drop(db);

    let db = SocialDb::open(&path).unwrap();
    let p = post(&db, p.id);
    assert_eq!(p.original_root_id, None);
    assert_eq!(p.liked_by, vec![ids[1]]);
    assert_eq!(p.like_count, 1);
}

#[test]
fn chained_copy_is_adopted_when_touched() {
    let (_dir, path, db) = create_temp_db("chain_runtime.sqlite");
    let ids = create_users(&db, &["alice", "bob", "carol", "dave"]);
    let (alice, bob, carol, dave) = (ids[0], ids[1], ids[2], ids[3]);
    let root = db.create_post(alice, "root", None, None).unwrap();
    let bob_copy = db.toggle_repost(bob, root.id).unwrap().copy_id.unwrap();
    let chained = {
        let conn = open_raw(&path);
        conn.execute(
            "INSERT INTO posts(author_id, content, original_root_id, created_at_ms) VALUES (?1, 'root', ?2, 0)",
            params![carol, bob_copy],
        )
        .unwrap();
        conn.last_insert_rowid()
    };

    let liked = db.toggle_like(dave, chained).unwrap();
    assert_eq!(liked.post.id, root.id);
    assert_eq!(liked.post.reposted_by, vec![bob, carol]);
    assert_eq!(liked.post.repost_count, 2);
    assert_eq!(post(&db, chained).original_root_id, Some(root.id));
    assert_copies_in_sync(&db, root.id);
}

#[test]
fn chained_copy_duplicating_a_repost_is_removed() {
    let (_dir, path, db) = create_temp_db("chain_duplicate.sqlite");
    let ids = create_users(&db, &["alice", "bob", "carol"]);
    let (alice, bob, carol) = (ids[0], ids[1], ids[2]);
    let root = db.create_post(alice, "root", None, None).unwrap();
    let bob_copy = db.toggle_repost(bob, root.id).unwrap().copy_id.unwrap();
    let carol_copy = db.toggle_repost(carol, root.id).unwrap().copy_id.unwrap();
    let chained = {
        let conn = open_raw(&path);
        conn.execute(
            "INSERT INTO posts(author_id, content, original_root_id, created_at_ms) VALUES (?1, 'root', ?2, 0)",
            params![carol, bob_copy],
        )
        .unwrap();
        conn.last_insert_rowid()
    };

    let resolved = db.resolve_root(chained).unwrap();
    assert_eq!(resolved.id, root.id);
    assert!(db.get_post(chained).unwrap().is_none());
    let copies: Vec<i64> = db.reposts_of(root.id).unwrap().iter().map(|c| c.id).collect();
    assert_eq!(copies, vec![bob_copy, carol_copy]);
    assert_copies_in_sync(&db, root.id);
}

#[test]
fn duplicate_copies_collapse_to_the_oldest() {
    let (_dir, path, db) = create_temp_db("duplicates.sqlite");
    let ids = create_users(&db, &["alice", "bob"]);
    let (alice, bob) = (ids[0], ids[1]);
    let root = db.create_post(alice, "root", None, None).unwrap();
    let first = db.toggle_repost(bob, root.id).unwrap().copy_id.unwrap();
    {
        let conn = open_raw(&path);
        conn.execute_batch("DROP INDEX idx_posts_repost_owner;").unwrap();
        for _ in 0..2 {
            conn.execute(
                "INSERT INTO posts(author_id, content, original_root_id, created_at_ms) VALUES (?1, 'root', ?2, 0)",
                params![bob, root.id],
            )
            .unwrap();
        }
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM posts WHERE original_root_id=?1", root.id), 3);
    }
    drop(db);

    let db = SocialDb::open(&path).unwrap();
    let copies = db.reposts_of(root.id).unwrap();
    assert_eq!(copies.iter().map(|c| c.id).collect::<Vec<_>>(), vec![first]);

    let undone = db.toggle_repost(bob, root.id).unwrap();
    assert_eq!(undone.action, RepostAction::Deleted);
    assert!(db.reposts_of(root.id).unwrap().is_empty());
    assert_eq!(undone.root.repost_count, 0);
}

#[test]
fn copy_without_membership_is_removed_on_toggle() {
    let (_dir, path, db) = create_temp_db("stray_copy.sqlite");
    let ids = create_users(&db, &["alice", "bob"]);
    let root = db.create_post(ids[0], "root", None, None).unwrap();
    db.toggle_repost(ids[1], root.id).unwrap();
    open_raw(&path)
        .execute("DELETE FROM post_reposts WHERE post_id=?1", params![root.id])
        .unwrap();

    let outcome = db.toggle_repost(ids[1], root.id).unwrap();
    assert_eq!(outcome.action, RepostAction::Deleted);
    assert!(db.reposts_of(root.id).unwrap().is_empty());
}

#[test]
fn failed_delete_leaves_everything_in_place() {
    let (_dir, path, db) = create_temp_db("rollback.sqlite");
    let ids = create_users(&db, &["alice", "bob", "carol"]);
    let (alice, bob, carol) = (ids[0], ids[1], ids[2]);
    let root = db.create_post(alice, "root", None, None).unwrap();
    let reply = db.create_post(bob, "reply", None, Some(root.id)).unwrap();
    let copy = db.toggle_repost(bob, root.id).unwrap().copy_id.unwrap();
    db.toggle_like(carol, root.id).unwrap();
    let msg = db.share_to_message(root.id, carol, bob).unwrap();

    let conn = open_raw(&path);
    conn.execute_batch(&format!(
        "CREATE TRIGGER block_root_delete BEFORE DELETE ON posts WHEN OLD.id = {} \
         BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
        root.id
    ))
    .unwrap();

    assert!(matches!(db.delete_post(root.id), Err(FeedError::Storage(_))));
    assert!(db.get_post(copy).unwrap().is_some());
    assert!(db.get_post(reply.id).unwrap().is_some());
    assert_eq!(db.get_message(msg.id).unwrap().unwrap().shared_post_id, Some(root.id));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM activities WHERE post_id=?1", root.id), 3);
    let r = post(&db, root.id);
    assert_eq!(r.liked_by, vec![carol]);
    assert_eq!(r.reply_count, 1);
    assert_copies_in_sync(&db, root.id);

    conn.execute_batch("DROP TRIGGER block_root_delete;").unwrap();
    assert_eq!(db.delete_post(root.id).unwrap().posts_deleted, 3);
}

#[test]
fn concurrent_likes_from_different_users_all_count() {
    let (_dir, _path, db) = create_temp_db("concurrent_likes.sqlite");
    let names: Vec<String> = (0..8).map(|i| format!("user{i}")).collect();
    let users = create_users(&db, &names.iter().map(String::as_str).collect::<Vec<_>>());
    let root = db.create_post(users[0], "popular", None, None).unwrap();
    let copy = db.toggle_repost(users[1], root.id).unwrap().copy_id.unwrap();

    let handles: Vec<_> = users
        .iter()
        .map(|&u| {
            let db = db.clone();
            let target = if u % 2 == 0 { root.id } else { copy };
            thread::spawn(move || db.toggle_like(u, target).unwrap())
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let r = post(&db, root.id);
    assert_eq!(r.like_count, users.len() as u64);
    assert_eq!(r.liked_by, users);
    assert_copies_in_sync(&db, root.id);
}

#[test]
fn concurrent_toggles_from_one_user_settle_consistently() {
    let (_dir, _path, db) = create_temp_db("concurrent_toggles.sqlite");
    let ids = create_users(&db, &["alice", "bob"]);
    let root = db.create_post(ids[0], "root", None, None).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let db = db.clone();
            let bob = ids[1];
            let root_id = root.id;
            thread::spawn(move || {
                for _ in 0..5 {
                    db.toggle_like(bob, root_id).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // Twenty serialised toggles end where they started.
    let r = post(&db, root.id);
    assert_eq!(r.like_count, 0);
    assert!(r.liked_by.is_empty());
}

#[test]
fn concurrent_reposts_keep_one_copy_each() {
    let (_dir, _path, db) = create_temp_db("concurrent_reposts.sqlite");
    let names: Vec<String> = (0..6).map(|i| format!("user{i}")).collect();
    let users = create_users(&db, &names.iter().map(String::as_str).collect::<Vec<_>>());
    let root = db.create_post(users[0], "root", None, None).unwrap();

    let handles: Vec<_> = users[1..]
        .iter()
        .map(|&u| {
            let db = db.clone();
            let root_id = root.id;
            thread::spawn(move || db.toggle_repost(u, root_id).unwrap())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap().action, RepostAction::Created);
    }

    assert_eq!(db.reposts_of(root.id).unwrap().len(), users.len() - 1);
    assert_eq!(post(&db, root.id).repost_count, (users.len() - 1) as u64);
    assert_copies_in_sync(&db, root.id);
}
