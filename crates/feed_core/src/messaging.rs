/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{FeedError, Result};
use crate::notifications::emit;
use crate::post_graph::resolve_root;
use crate::social_db::{
    ensure_user, load_user, map_message_row, now_ms, require_post, Message, SocialDb, User, MESSAGE_COLS,
};
use feed_protocol::ActivityType;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

fn insert_message(
    conn: &Connection,
    sender_id: i64,
    recipient_id: i64,
    content: &str,
    shared_post_id: Option<i64>,
) -> Result<Message> {
    conn.execute(
        r#"
        INSERT INTO messages(sender_id, recipient_id, content, shared_post_id, created_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![sender_id, recipient_id, content, shared_post_id, now_ms()],
    )?;
    let id = conn.last_insert_rowid();
    Ok(conn.query_row(
        &format!("SELECT {MESSAGE_COLS} FROM messages WHERE id=?1"),
        params![id],
        map_message_row,
    )?)
}

pub(crate) fn detach_shared_post(conn: &Connection, post_id: i64) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE messages SET shared_post_id=NULL WHERE shared_post_id=?1",
        params![post_id],
    )?)
}

impl SocialDb {
    pub fn send_message(&self, sender_id: i64, recipient_id: i64, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(FeedError::validation("message content is empty"));
        }
        let msg = self.write(|tx| {
            ensure_user(tx, sender_id)?;
            ensure_user(tx, recipient_id)?;
            let msg = insert_message(tx, sender_id, recipient_id, content, None)?;
            emit(tx, ActivityType::Message, sender_id, recipient_id, None)?;
            Ok(msg)
        })?;
        info!(message_id = msg.id, sender_id, recipient_id, "message sent");
        Ok(msg)
    }

    /// Sends the canonical root of `post_id` to `recipient_id` as a chat message.
    /// Recorded as a SHARE activity even when sender and recipient match.
    pub fn share_to_message(&self, post_id: i64, sender_id: i64, recipient_id: i64) -> Result<Message> {
        let text = self.share_message_text().to_string();
        let msg = self.write(|tx| {
            ensure_user(tx, sender_id)?;
            ensure_user(tx, recipient_id)?;
            let root = resolve_root(tx, require_post(tx, post_id)?)?;
            let msg = insert_message(tx, sender_id, recipient_id, &text, Some(root.id))?;
            emit(tx, ActivityType::Share, sender_id, recipient_id, Some(root.id))?;
            Ok(msg)
        })?;
        info!(message_id = msg.id, post_id, sender_id, recipient_id, "post shared");
        Ok(msg)
    }

    pub fn get_message(&self, message_id: i64) -> Result<Option<Message>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {MESSAGE_COLS} FROM messages WHERE id=?1"),
                    params![message_id],
                    map_message_row,
                )
                .optional()?)
        })
    }

    /// Messages between two users, oldest first.
    pub fn conversation(&self, user_a: i64, user_b: i64) -> Result<Vec<Message>> {
        self.read(|conn| {
            ensure_user(conn, user_a)?;
            ensure_user(conn, user_b)?;
            let mut stmt = conn.prepare(&format!(
                r#"
                SELECT {MESSAGE_COLS} FROM messages
                WHERE (sender_id=?1 AND recipient_id=?2) OR (sender_id=?2 AND recipient_id=?1)
                ORDER BY id ASC
                "#
            ))?;
            let rows = stmt.query_map(params![user_a, user_b], map_message_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Everyone `user_id` has exchanged messages with, excluding themselves.
    pub fn chat_partners(&self, user_id: i64) -> Result<Vec<User>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT recipient_id FROM messages WHERE sender_id=?1
                UNION
                SELECT sender_id FROM messages WHERE recipient_id=?1
                "#,
            )?;
            let ids = stmt
                .query_map(params![user_id], |r| r.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let mut out = Vec::new();
            for id in ids.into_iter().filter(|id| *id != user_id) {
                if let Some(u) = load_user(conn, id)? {
                    out.push(u);
                }
            }
            out.sort_by(|a, b| a.username.cmp(&b.username));
            Ok(out)
        })
    }
}
