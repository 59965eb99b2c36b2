/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Activity rows derived from state transitions.
//!
//! Chat (`MESSAGE`) and everything else keep separate read state: marking one
//! side read never touches the other.

use crate::error::Result;
use crate::social_db::{ensure_user, map_activity_row, now_ms, Activity, CollectionPage, SocialDb, ACTIVITY_COLS};
use feed_protocol::ActivityType;
use rusqlite::{params, Connection};
use tracing::{debug, info};

/// Records an activity unless the actor is notifying themselves. Returns the new row id.
pub(crate) fn emit(
    conn: &Connection,
    kind: ActivityType,
    actor_id: i64,
    recipient_id: i64,
    post_id: Option<i64>,
) -> Result<Option<i64>> {
    if actor_id == recipient_id && !kind.notifies_self() {
        debug!(kind = kind.as_str(), actor_id, "self notification suppressed");
        return Ok(None);
    }
    conn.execute(
        r#"
        INSERT INTO activities(type, actor_id, recipient_id, post_id, created_at_ms, is_read)
        VALUES (?1, ?2, ?3, ?4, ?5, 0)
        "#,
        params![kind.as_str(), actor_id, recipient_id, post_id, now_ms()],
    )?;
    Ok(Some(conn.last_insert_rowid()))
}

pub(crate) fn purge_for_post(conn: &Connection, post_id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM activities WHERE post_id=?1", params![post_id])?)
}

fn read_scope(kind: ActivityType) -> &'static str {
    match kind {
        ActivityType::Message => "type='MESSAGE'",
        _ => "type<>'MESSAGE'",
    }
}

impl SocialDb {
    /// Activities addressed to `recipient_id`, newest first.
    pub fn list_activities(&self, recipient_id: i64, limit: u32, cursor: Option<i64>) -> Result<CollectionPage<Activity>> {
        let limit = self.page_limit(limit);
        self.read(|conn| {
            ensure_user(conn, recipient_id)?;
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM activities WHERE recipient_id=?1",
                params![recipient_id],
                |r| r.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACTIVITY_COLS} FROM activities WHERE recipient_id=?1 AND id < ?2 ORDER BY id DESC LIMIT ?3"
            ))?;
            let items = stmt
                .query_map(params![recipient_id, cursor.unwrap_or(i64::MAX), limit], map_activity_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let next = if items.len() as u32 == limit {
                items.last().map(|a| a.id.to_string())
            } else {
                None
            };
            Ok(CollectionPage { total, items, next })
        })
    }

    /// `MESSAGE` marks unread chat activities read; any other type marks every
    /// unread non-chat activity read. Returns the number of rows changed.
    pub fn mark_activities_read(&self, recipient_id: i64, kind: ActivityType) -> Result<u64> {
        let n = self.write(|tx| {
            ensure_user(tx, recipient_id)?;
            Ok(tx.execute(
                &format!(
                    "UPDATE activities SET is_read=1 WHERE recipient_id=?1 AND is_read=0 AND {}",
                    read_scope(kind)
                ),
                params![recipient_id],
            )?)
        })?;
        info!(recipient_id, kind = kind.as_str(), marked = n, "activities marked read");
        Ok(n as u64)
    }

    pub fn unread_count(&self, recipient_id: i64, kind: ActivityType) -> Result<u64> {
        self.read(|conn| {
            Ok(conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM activities WHERE recipient_id=?1 AND is_read=0 AND {}",
                    read_scope(kind)
                ),
                params![recipient_id],
                |r| r.get(0),
            )?)
        })
    }

    /// Unread chat activities per sender, as `(sender_id, count)` ordered by sender.
    pub fn unread_message_counts(&self, recipient_id: i64) -> Result<Vec<(i64, u64)>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT actor_id, COUNT(*) FROM activities
                WHERE recipient_id=?1 AND type='MESSAGE' AND is_read=0
                GROUP BY actor_id
                ORDER BY actor_id ASC
                "#,
            )?;
            let rows = stmt.query_map(params![recipient_id], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, u64>(1)?)))?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn mark_messages_read_from(&self, recipient_id: i64, sender_id: i64) -> Result<u64> {
        let n = self.write(|tx| {
            Ok(tx.execute(
                "UPDATE activities SET is_read=1 WHERE recipient_id=?1 AND actor_id=?2 AND type='MESSAGE' AND is_read=0",
                params![recipient_id, sender_id],
            )?)
        })?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp() -> (tempfile::TempDir, SocialDb) {
        let dir = tempfile::TempDir::new().unwrap();
        let db = SocialDb::open(dir.path().join("feed.sqlite")).unwrap();
        (dir, db)
    }

    #[test]
    fn self_notifications_are_dropped_except_share() {
        let (_dir, db) = open_tmp();
        let a = db.create_user("a", None).unwrap();
        db.write(|tx| {
            assert!(emit(tx, ActivityType::Like, a.id, a.id, None)?.is_none());
            assert!(emit(tx, ActivityType::Message, a.id, a.id, None)?.is_none());
            assert!(emit(tx, ActivityType::Share, a.id, a.id, None)?.is_some());
            Ok(())
        })
        .unwrap();
        let page = db.list_activities(a.id, 10, None).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].kind, ActivityType::Share);
        assert!(!page.items[0].read);
    }

    #[test]
    fn chat_and_bell_read_state_are_independent() {
        let (_dir, db) = open_tmp();
        let a = db.create_user("a", None).unwrap();
        let b = db.create_user("b", None).unwrap();
        db.write(|tx| {
            emit(tx, ActivityType::Follow, b.id, a.id, None)?;
            emit(tx, ActivityType::Message, b.id, a.id, None)?;
            emit(tx, ActivityType::Message, b.id, a.id, None)?;
            Ok(())
        })
        .unwrap();

        assert_eq!(db.mark_activities_read(a.id, ActivityType::Like).unwrap(), 1);
        assert_eq!(db.unread_count(a.id, ActivityType::Follow).unwrap(), 0);
        assert_eq!(db.unread_count(a.id, ActivityType::Message).unwrap(), 2);
        assert_eq!(db.unread_message_counts(a.id).unwrap(), vec![(b.id, 2)]);

        assert_eq!(db.mark_messages_read_from(a.id, b.id).unwrap(), 2);
        assert_eq!(db.unread_count(a.id, ActivityType::Message).unwrap(), 0);
    }

    #[test]
    fn listing_is_newest_first() {
        let (_dir, db) = open_tmp();
        let a = db.create_user("a", None).unwrap();
        let b = db.create_user("b", None).unwrap();
        let (first, second) = db
            .write(|tx| {
                let first = emit(tx, ActivityType::Follow, b.id, a.id, None)?;
                let second = emit(tx, ActivityType::Message, b.id, a.id, None)?;
                Ok((first, second))
            })
            .unwrap();
        let ids: Vec<_> = db.list_activities(a.id, 10, None).unwrap().items.into_iter().map(|x| Some(x.id)).collect();
        assert_eq!(ids, vec![second, first]);
        assert!(db.list_activities(999, 10, None).unwrap_err().is_not_found());
    }
}
