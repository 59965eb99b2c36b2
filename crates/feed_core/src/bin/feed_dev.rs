/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use feed_core::{load_config, SocialDb};
use feed_protocol::{ActivityType, MarkReadRequest};
use serde_json::{json, Value};
use tracing::info;

const USAGE: &str = "usage: feed_dev <config.json> <command> [args...]

commands:
  user <username> [display_name]
  post <user> <content> [image_ref]
  reply <user> <parent_id> <content>
  like <user> <post_id>
  repost <user> <post_id>
  follow <follower> <target>
  message <from> <to> <content>
  share <post_id> <from> <to>
  delete <post_id>
  activities <user>
  read <user> <type>
  demo";

fn arg<'a>(rest: &'a [String], idx: usize, name: &str) -> Result<&'a str> {
    rest.get(idx)
        .map(|s| s.as_str())
        .with_context(|| format!("missing argument <{name}>\n\n{USAGE}"))
}

fn arg_id(rest: &[String], idx: usize, name: &str) -> Result<i64> {
    arg(rest, idx, name)?
        .parse::<i64>()
        .with_context(|| format!("<{name}> must be a numeric id"))
}

/// Accepts a numeric id or a username.
fn user_ref(db: &SocialDb, rest: &[String], idx: usize, name: &str) -> Result<i64> {
    let raw = arg(rest, idx, name)?;
    if let Ok(id) = raw.parse::<i64>() {
        return Ok(id);
    }
    let user = db
        .find_user_by_username(raw)?
        .with_context(|| format!("unknown user: {raw}"))?;
    Ok(user.id)
}

fn ensure_user(db: &SocialDb, username: &str) -> Result<i64> {
    if let Some(u) = db.find_user_by_username(username)? {
        return Ok(u.id);
    }
    Ok(db.create_user(username, None)?.id)
}

/// alice posts, bob reposts and likes through his copy, alice deletes the root.
fn run_demo(db: &SocialDb) -> Result<Value> {
    let alice = ensure_user(db, "alice")?;
    let bob = ensure_user(db, "bob")?;
    let p1 = db.create_post(alice, "hello", None, None)?;
    let repost = db.toggle_repost(bob, p1.id)?;
    let copy_id = repost.copy_id.context("repost did not create a copy")?;
    let liked = db.toggle_like(bob, copy_id)?;
    let copy = db.get_post(copy_id)?;
    let stats = db.delete_post(p1.id)?;
    Ok(json!({
        "root": p1,
        "repost": repost.response(),
        "like": { "action": liked.action, "root": liked.post },
        "copy_after_like": copy,
        "delete": stats,
        "copy_exists_after_delete": db.get_post(copy_id)?.is_some(),
    }))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cfg_path = arg(&args, 0, "config.json")?;
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("demo");
    let rest = args.get(2..).unwrap_or_default();

    let cfg = load_config(cfg_path)?;
    info!("feed_dev {} db={}", feed_core::feed_core_version(), cfg.db_path().display());
    let db = SocialDb::open_with_config(&cfg).context("open feed db")?;

    let out: Value = match cmd {
        "user" => json!(db.create_user(arg(rest, 0, "username")?, rest.get(1).map(|s| s.as_str()))?),
        "post" => {
            let author = user_ref(&db, rest, 0, "user")?;
            json!(db.create_post(author, arg(rest, 1, "content")?, rest.get(2).map(|s| s.as_str()), None)?)
        }
        "reply" => {
            let author = user_ref(&db, rest, 0, "user")?;
            let parent = arg_id(rest, 1, "parent_id")?;
            json!(db.create_post(author, arg(rest, 2, "content")?, None, Some(parent))?)
        }
        "like" => json!(db.toggle_like(user_ref(&db, rest, 0, "user")?, arg_id(rest, 1, "post_id")?)?),
        "repost" => json!(db.toggle_repost(user_ref(&db, rest, 0, "user")?, arg_id(rest, 1, "post_id")?)?.response()),
        "follow" => json!(db.toggle_follow(user_ref(&db, rest, 0, "follower")?, user_ref(&db, rest, 1, "target")?)?),
        "message" => {
            let from = user_ref(&db, rest, 0, "from")?;
            let to = user_ref(&db, rest, 1, "to")?;
            json!(db.send_message(from, to, arg(rest, 2, "content")?)?)
        }
        "share" => {
            let post = arg_id(rest, 0, "post_id")?;
            json!(db.share_to_message(post, user_ref(&db, rest, 1, "from")?, user_ref(&db, rest, 2, "to")?)?)
        }
        "delete" => json!(db.delete_post(arg_id(rest, 0, "post_id")?)?),
        "activities" => json!(db.list_activities(user_ref(&db, rest, 0, "user")?, 50, None)?),
        "read" => {
            let user = user_ref(&db, rest, 0, "user")?;
            let raw = arg(rest, 1, "type")?;
            let kind = ActivityType::parse(raw).with_context(|| format!("unknown activity type: {raw}"))?;
            let req = MarkReadRequest { recipient_id: user, kind };
            let marked = db.mark_activities_read(req.recipient_id, req.kind)?;
            json!({ "request": req, "marked": marked })
        }
        "demo" => run_demo(&db)?,
        other => anyhow::bail!("unknown command: {other}\n\n{USAGE}"),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
