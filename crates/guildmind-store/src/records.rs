//! Typed domain queries over the storage port. Components never build raw
//! selectors themselves; the shapes the system needs live here.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::debug;

use guildmind_core::types::{iso, Channel, DailySummary, Member, Message, SystemLogRow};

use crate::error::StoreError;
use crate::query::Filter;
use crate::Store;

fn from_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(|r| serde_json::from_value(r).map_err(StoreError::from))
        .collect()
}

// -- messages ---------------------------------------------------------------

pub async fn upsert_messages(store: &Store, msgs: &[Message]) -> Result<u64, StoreError> {
    if msgs.is_empty() {
        return Ok(0);
    }
    let rows: Result<Vec<Value>, _> = msgs.iter().map(serde_json::to_value).collect();
    store
        .table("messages")
        .upsert(rows?, "message_id")
        .await
}

pub async fn get_message(store: &Store, message_id: u64) -> Result<Option<Message>, StoreError> {
    let row = store
        .table("messages")
        .eq("message_id", message_id)
        .fetch_one()
        .await?;
    row.map(|r| serde_json::from_value(r).map_err(StoreError::from))
        .transpose()
}

/// Tombstone: `is_deleted` only ever goes false → true.
pub async fn mark_message_deleted(store: &Store, message_id: u64) -> Result<(), StoreError> {
    store
        .table("messages")
        .eq("message_id", message_id)
        .update(json!({"is_deleted": true}))
        .await?;
    Ok(())
}

pub async fn update_message_edit(
    store: &Store,
    message_id: u64,
    content: &str,
    edited_at: Option<DateTime<Utc>>,
    embeds: &[Value],
) -> Result<(), StoreError> {
    store
        .table("messages")
        .eq("message_id", message_id)
        .update(json!({
            "content": content,
            "edited_at": edited_at.as_ref().map(iso),
            "embeds": embeds,
        }))
        .await?;
    Ok(())
}

/// Recompute the reactor set for one `(message_id, user_id)` observation.
/// The bot's own id never enters the set; `reaction_count` saturates at 0.
/// Returns false when the message row does not exist yet.
pub async fn apply_reaction(
    store: &Store,
    message_id: u64,
    user_id: u64,
    added: bool,
    bot_id: u64,
) -> Result<bool, StoreError> {
    let Some(mut msg) = get_message(store, message_id).await? else {
        return Ok(false);
    };

    if added {
        msg.reaction_count = msg.reaction_count.saturating_add(1);
        if user_id != bot_id {
            msg.reactors.insert(user_id);
        }
    } else {
        msg.reaction_count = msg.reaction_count.saturating_sub(1);
        msg.reactors.remove(&user_id);
    }

    store
        .table("messages")
        .eq("message_id", message_id)
        .update(json!({
            "reaction_count": msg.reaction_count,
            "reactors": serde_json::to_value(
                msg.reactors.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
            )?,
        }))
        .await?;
    Ok(true)
}

pub async fn update_attachment_urls(
    store: &Store,
    message_id: u64,
    attachments: &[guildmind_core::types::Attachment],
) -> Result<(), StoreError> {
    store
        .table("messages")
        .eq("message_id", message_id)
        .update(json!({"attachments": serde_json::to_value(attachments)?}))
        .await?;
    Ok(())
}

pub async fn messages_in_window(
    store: &Store,
    channel_id: u64,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> Result<Vec<Message>, StoreError> {
    let rows = store
        .table("messages")
        .eq("channel_id", channel_id)
        .gte("created_at", iso(start))
        .lt("created_at", iso(end))
        .eq("is_deleted", false)
        .order("created_at", true)
        .fetch()
        .await?;
    from_rows(rows)
}

pub async fn message_count_in_window(
    store: &Store,
    channel_id: u64,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> Result<usize, StoreError> {
    let rows = store
        .table("messages")
        .select("message_id")
        .eq("channel_id", channel_id)
        .gte("created_at", iso(start))
        .lt("created_at", iso(end))
        .eq("is_deleted", false)
        .fetch()
        .await?;
    Ok(rows.len())
}

/// Latest `created_at` stored for a channel inside a range — the backfill
/// resume point.
pub async fn latest_message_time(
    store: &Store,
    channel_id: u64,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let row = store
        .table("messages")
        .select("created_at")
        .eq("channel_id", channel_id)
        .gte("created_at", iso(start))
        .lt("created_at", iso(end))
        .order("created_at", false)
        .fetch_one()
        .await?;
    Ok(row
        .and_then(|r| r.get("created_at").and_then(Value::as_str).map(String::from))
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

/// Candidate media posts in a window, optionally restricted to a channel
/// set. Video/ranking filters happen in [`crate::records`] callers since
/// filename matching inside JSON is not portable across backends.
pub async fn media_messages_in_window(
    store: &Store,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    channel_ids: Option<&[u64]>,
) -> Result<Vec<Message>, StoreError> {
    if channel_ids.is_some_and(|ids| ids.is_empty()) {
        return Ok(Vec::new());
    }
    let mut q = store
        .table("messages")
        .gte("created_at", iso(start))
        .lt("created_at", iso(end))
        .eq("is_deleted", false)
        .neq("attachments", json!([]));
    if let Some(ids) = channel_ids {
        q = q.r#in(
            "channel_id",
            ids.iter().map(|id| json!(id)).collect(),
        );
    }
    let rows = q.order("created_at", false).fetch().await?;
    from_rows(rows)
}

pub async fn search_messages(
    store: &Store,
    query: &str,
    since: &DateTime<Utc>,
    limit: usize,
) -> Result<Vec<Message>, StoreError> {
    let pattern = format!("%{}%", query.replace('%', ""));
    let rows = store
        .table("messages")
        .ilike("content", &pattern)
        .gte("created_at", iso(since))
        .eq("is_deleted", false)
        .order("created_at", false)
        .limit(limit)
        .fetch()
        .await?;
    from_rows(rows)
}

pub async fn messages_indexed_since_count(
    store: &Store,
    since: &DateTime<Utc>,
) -> Result<usize, StoreError> {
    let rows = store
        .table("messages")
        .select("message_id")
        .gte("indexed_at", iso(since))
        .fetch()
        .await?;
    Ok(rows.len())
}

pub async fn any_reactions_since(
    store: &Store,
    since: &DateTime<Utc>,
) -> Result<bool, StoreError> {
    let row = store
        .table("messages")
        .select("message_id")
        .gte("created_at", iso(since))
        .gte("reaction_count", 1)
        .fetch_one()
        .await?;
    Ok(row.is_some())
}

/// Channels ranked by message volume since `since`, descending.
pub async fn active_channel_counts(
    store: &Store,
    since: &DateTime<Utc>,
) -> Result<Vec<(u64, usize)>, StoreError> {
    let rows = store
        .table("messages")
        .select("channel_id")
        .gte("created_at", iso(since))
        .eq("is_deleted", false)
        .fetch()
        .await?;

    let mut counts: HashMap<u64, usize> = HashMap::new();
    for row in rows {
        if let Some(id) = id_field(&row, "channel_id") {
            *counts.entry(id).or_default() += 1;
        }
    }
    let mut out: Vec<(u64, usize)> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    Ok(out)
}

/// A message with its chronological neighbours and direct replies.
pub async fn message_context(
    store: &Store,
    msg: &Message,
    surrounding: usize,
) -> Result<(Vec<Message>, Vec<Message>, Vec<Message>), StoreError> {
    let before = store
        .table("messages")
        .eq("channel_id", msg.channel_id)
        .lt("created_at", iso(&msg.created_at))
        .eq("is_deleted", false)
        .order("created_at", false)
        .limit(surrounding)
        .fetch()
        .await?;
    let after = store
        .table("messages")
        .eq("channel_id", msg.channel_id)
        .gte("created_at", iso(&msg.created_at))
        .neq("message_id", msg.message_id)
        .eq("is_deleted", false)
        .order("created_at", true)
        .limit(surrounding)
        .fetch()
        .await?;
    let replies = store
        .table("messages")
        .eq("reference_id", msg.message_id)
        .eq("is_deleted", false)
        .order("created_at", true)
        .fetch()
        .await?;

    let mut before: Vec<Message> = from_rows(before)?;
    before.reverse();
    Ok((before, from_rows(after)?, from_rows(replies)?))
}

pub async fn messages_by_author_around(
    store: &Store,
    author_id: u64,
    center: &DateTime<Utc>,
    half_window: chrono::Duration,
    cap: usize,
) -> Result<Vec<Message>, StoreError> {
    let rows = store
        .table("messages")
        .eq("author_id", author_id)
        .gte("created_at", iso(&(*center - half_window)))
        .lt("created_at", iso(&(*center + half_window)))
        .eq("is_deleted", false)
        .order("created_at", true)
        .limit(cap)
        .fetch()
        .await?;
    from_rows(rows)
}

// -- members ----------------------------------------------------------------

/// Identity upsert from gateway observations. Writes only identity columns
/// so stored preferences survive every refresh.
pub async fn upsert_member_identity(store: &Store, m: &Member) -> Result<(), StoreError> {
    let row = json!({
        "member_id": m.member_id.to_string(),
        "username": m.username,
        "global_name": m.global_name,
        "server_nick": m.server_nick,
        "avatar_url": m.avatar_url,
        "discord_created_at": m.discord_created_at.as_ref().map(iso),
        "guild_join_date": m.guild_join_date.as_ref().map(iso),
        "role_ids": m.role_ids.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
    });
    store.table("members").upsert(vec![row], "member_id").await?;
    Ok(())
}

/// Preference writes (consent, DM opt-out, curation permission, handles).
/// Creates the row if the member was never indexed.
pub async fn set_member_prefs(
    store: &Store,
    member_id: u64,
    username: &str,
    patch: Value,
) -> Result<(), StoreError> {
    let mut row = json!({
        "member_id": member_id.to_string(),
        "username": username,
    });
    if let (Some(obj), Some(patch_obj)) = (row.as_object_mut(), patch.as_object()) {
        for (k, v) in patch_obj {
            obj.insert(k.clone(), v.clone());
        }
    }
    store.table("members").upsert(vec![row], "member_id").await?;
    Ok(())
}

pub async fn get_member(store: &Store, member_id: u64) -> Result<Option<Member>, StoreError> {
    let row = store
        .table("members")
        .eq("member_id", member_id)
        .fetch_one()
        .await?;
    row.map(|r| serde_json::from_value(r).map_err(StoreError::from))
        .transpose()
}

pub async fn find_member_by_username(
    store: &Store,
    name: &str,
) -> Result<Option<Member>, StoreError> {
    let row = store
        .table("members")
        .or(vec![
            Filter::Ilike("username".into(), name.into()),
            Filter::Ilike("global_name".into(), name.into()),
            Filter::Ilike("server_nick".into(), name.into()),
        ])
        .fetch_one()
        .await?;
    row.map(|r| serde_json::from_value(r).map_err(StoreError::from))
        .transpose()
}

pub async fn members_by_ids(
    store: &Store,
    ids: &[u64],
) -> Result<HashMap<u64, Member>, StoreError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = store
        .table("members")
        .r#in("member_id", ids.iter().map(|id| json!(id)).collect())
        .fetch()
        .await?;
    let members: Vec<Member> = from_rows(rows)?;
    Ok(members.into_iter().map(|m| (m.member_id, m)).collect())
}

// -- channels ---------------------------------------------------------------

/// Identity upsert: name/category/nsfw only, so curator enrichment fields
/// survive gateway refreshes.
pub async fn upsert_channel_identity(store: &Store, c: &Channel) -> Result<(), StoreError> {
    let row = json!({
        "channel_id": c.channel_id.to_string(),
        "name": c.name,
        "category_id": c.category_id.map(|id| id.to_string()),
        "nsfw": c.nsfw,
    });
    store
        .table("channels")
        .upsert(vec![row], "channel_id")
        .await?;
    Ok(())
}

pub async fn get_channel(store: &Store, channel_id: u64) -> Result<Option<Channel>, StoreError> {
    let row = store
        .table("channels")
        .eq("channel_id", channel_id)
        .fetch_one()
        .await?;
    row.map(|r| serde_json::from_value(r).map_err(StoreError::from))
        .transpose()
}

/// Channels in the monitor set: listed directly or children of a listed
/// category.
pub async fn monitored_channels(
    store: &Store,
    monitor_ids: &[u64],
) -> Result<Vec<Channel>, StoreError> {
    if monitor_ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Value> = monitor_ids.iter().map(|id| json!(id)).collect();
    let rows = store
        .table("channels")
        .or(vec![
            Filter::In("channel_id".into(), ids.clone()),
            Filter::In("category_id".into(), ids),
        ])
        .fetch()
        .await?;
    from_rows(rows)
}

pub async fn set_channel_summary_thread(
    store: &Store,
    channel_id: u64,
    thread_id: u64,
) -> Result<(), StoreError> {
    store
        .table("channels")
        .eq("channel_id", channel_id)
        .update(json!({"summary_thread_id": thread_id.to_string()}))
        .await?;
    Ok(())
}

// -- daily summaries --------------------------------------------------------

pub async fn get_daily_summary(
    store: &Store,
    date: NaiveDate,
    channel_id: u64,
) -> Result<Option<DailySummary>, StoreError> {
    let row = store
        .table("daily_summaries")
        .eq("date", date.to_string())
        .eq("channel_id", channel_id)
        .fetch_one()
        .await?;
    row.map(|r| serde_json::from_value(r).map_err(StoreError::from))
        .transpose()
}

/// Upsert on `(date, channel_id)`; combined with the pre-run completed check
/// this keeps at most one completed row per key.
pub async fn upsert_daily_summary(store: &Store, s: &DailySummary) -> Result<(), StoreError> {
    let row = serde_json::to_value(s)?;
    store
        .table("daily_summaries")
        .upsert(vec![row], "date,channel_id")
        .await?;
    Ok(())
}

pub async fn any_completed_summary_on(
    store: &Store,
    date: NaiveDate,
) -> Result<bool, StoreError> {
    let row = store
        .table("daily_summaries")
        .select("channel_id")
        .eq("date", date.to_string())
        .eq("status", "completed")
        .fetch_one()
        .await?;
    Ok(row.is_some())
}

// -- system logs / assets ---------------------------------------------------

pub async fn insert_system_logs(store: &Store, rows: &[SystemLogRow]) -> Result<(), StoreError> {
    if rows.is_empty() {
        return Ok(());
    }
    let rows: Result<Vec<Value>, _> = rows.iter().map(serde_json::to_value).collect();
    let n = store.table("system_logs").insert(rows?).await?;
    debug!(n, "system log rows written");
    Ok(())
}

pub async fn insert_asset(
    store: &Store,
    asset_id: &str,
    author_id: u64,
    message_id: u64,
    workflow_url: &str,
    model: Option<&str>,
    variant: Option<&str>,
) -> Result<(), StoreError> {
    store
        .table("assets")
        .upsert(
            vec![json!({
                "asset_id": asset_id,
                "author_id": author_id.to_string(),
                "message_id": message_id.to_string(),
                "workflow_url": workflow_url,
                "model": model,
                "variant": variant,
                "created_at": iso(&Utc::now()),
            })],
            "asset_id",
        )
        .await?;
    Ok(())
}

pub async fn insert_asset_media(
    store: &Store,
    asset_id: &str,
    media_url: &str,
    media_type: Option<&str>,
) -> Result<(), StoreError> {
    store
        .table("asset_media")
        .upsert(
            vec![json!({
                "asset_id": asset_id,
                "media_url": media_url,
                "media_type": media_type,
            })],
            "asset_id,media_url",
        )
        .await?;
    Ok(())
}

fn id_field(row: &Value, key: &str) -> Option<u64> {
    match row.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use guildmind_core::types::jump_url;
    use std::collections::BTreeSet;

    fn msg(id: u64, channel: u64, ts: &str) -> Message {
        Message {
            message_id: id,
            channel_id: channel,
            author_id: 3,
            content: format!("message {id}"),
            created_at: DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
            edited_at: None,
            attachments: vec![],
            embeds: vec![],
            reaction_count: 0,
            reactors: BTreeSet::new(),
            reference_id: None,
            thread_id: None,
            is_pinned: false,
            is_deleted: false,
            jump_url: jump_url(1, channel, id),
            indexed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn message_roundtrip_and_replay_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        let batch = vec![
            msg(1, 10, "2025-03-10T08:00:00Z"),
            msg(2, 10, "2025-03-10T09:00:00Z"),
        ];
        upsert_messages(&store, &batch).await.unwrap();
        // Replaying the same batch yields the same store state.
        upsert_messages(&store, &batch).await.unwrap();

        let start = Utc.with_ymd_and_hms(2025, 3, 10, 7, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 11, 7, 0, 0).unwrap();
        let got = messages_in_window(&store, 10, &start, &end).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].message_id, 1);
    }

    #[tokio::test]
    async fn reaction_set_excludes_bot_and_bounds_count() {
        let store = Store::in_memory().await.unwrap();
        let bot_id = 999;
        upsert_messages(&store, &[msg(1, 10, "2025-03-10T08:00:00Z")])
            .await
            .unwrap();

        apply_reaction(&store, 1, 42, true, bot_id).await.unwrap();
        apply_reaction(&store, 1, bot_id, true, bot_id).await.unwrap();
        let m = get_message(&store, 1).await.unwrap().unwrap();
        assert_eq!(m.reaction_count, 2);
        assert!(m.reactors.contains(&42));
        assert!(!m.reactors.contains(&bot_id));
        assert!(m.reactors.len() <= m.reaction_count as usize);

        // Removals never drive the count negative.
        for _ in 0..5 {
            apply_reaction(&store, 1, 42, false, bot_id).await.unwrap();
        }
        let m = get_message(&store, 1).await.unwrap().unwrap();
        assert_eq!(m.reaction_count, 0);
        assert!(m.reactors.is_empty());
    }

    #[tokio::test]
    async fn delete_is_tombstone_not_removal() {
        let store = Store::in_memory().await.unwrap();
        upsert_messages(&store, &[msg(1, 10, "2025-03-10T08:00:00Z")])
            .await
            .unwrap();
        mark_message_deleted(&store, 1).await.unwrap();

        let m = get_message(&store, 1).await.unwrap().unwrap();
        assert!(m.is_deleted);

        let start = Utc.with_ymd_and_hms(2025, 3, 10, 7, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 11, 7, 0, 0).unwrap();
        assert!(messages_in_window(&store, 10, &start, &end)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn identity_upsert_preserves_preferences() {
        let store = Store::in_memory().await.unwrap();
        set_member_prefs(&store, 5, "alice", json!({"sharing_consent": true}))
            .await
            .unwrap();

        let m = Member {
            member_id: 5,
            username: "alice2".into(),
            ..Default::default()
        };
        upsert_member_identity(&store, &m).await.unwrap();

        let got = get_member(&store, 5).await.unwrap().unwrap();
        assert_eq!(got.username, "alice2");
        assert_eq!(got.sharing_consent, Some(true));
        assert!(got.dm_preference);
    }

    #[tokio::test]
    async fn completed_summary_is_unique_per_day_channel() {
        let store = Store::in_memory().await.unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        let s = DailySummary {
            date,
            channel_id: 10,
            full_summary: Some("[]".into()),
            short_summary: None,
            thread_id: None,
            status: guildmind_core::types::SummaryStatus::Completed,
            error: None,
        };
        upsert_daily_summary(&store, &s).await.unwrap();
        upsert_daily_summary(&store, &s).await.unwrap();

        let rows = store
            .table("daily_summaries")
            .eq("date", date.to_string())
            .eq("channel_id", 10)
            .fetch()
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(any_completed_summary_on(&store, date).await.unwrap());
    }

    #[tokio::test]
    async fn monitored_channels_expand_categories() {
        let store = Store::in_memory().await.unwrap();
        for (id, cat) in [(1u64, Some(100u64)), (2, Some(200)), (3, None)] {
            upsert_channel_identity(
                &store,
                &Channel {
                    channel_id: id,
                    name: format!("chan-{id}"),
                    category_id: cat,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        // Monitor set lists channel 3 directly and category 100.
        let got = monitored_channels(&store, &[3, 100]).await.unwrap();
        let mut ids: Vec<u64> = got.iter().map(|c| c.channel_id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 3]);
    }
}
