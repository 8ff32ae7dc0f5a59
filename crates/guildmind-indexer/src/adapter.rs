//! One internal [`Message`] shape, filled from either the gateway or the
//! REST API. Duck-typed Discord objects never cross a crate boundary.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use guildmind_core::types::{jump_url, Attachment, Member, Message};

pub fn message_from_discord(
    msg: &serenity::model::channel::Message,
    guild_id: u64,
    indexed_at: DateTime<Utc>,
) -> Message {
    let channel_id = msg.channel_id.get();
    let reaction_count: u32 = msg
        .reactions
        .iter()
        .map(|r| r.count as u32)
        .sum();

    Message {
        message_id: msg.id.get(),
        channel_id,
        author_id: msg.author.id.get(),
        content: msg.content.clone(),
        created_at: timestamp_to_utc(&msg.timestamp),
        edited_at: msg.edited_timestamp.as_ref().map(timestamp_to_utc),
        attachments: msg.attachments.iter().map(attachment_from_discord).collect(),
        embeds: msg
            .embeds
            .iter()
            .filter_map(|e| serde_json::to_value(e).ok())
            .collect(),
        reaction_count,
        // Reactor identities arrive via reaction events; a message payload
        // only carries counts.
        reactors: BTreeSet::new(),
        reference_id: msg
            .message_reference
            .as_ref()
            .and_then(|r| r.message_id)
            .map(|id| id.get()),
        thread_id: msg.thread.as_ref().map(|t| t.id.get()),
        is_pinned: msg.pinned,
        is_deleted: false,
        jump_url: jump_url(guild_id, channel_id, msg.id.get()),
        indexed_at,
    }
}

pub fn attachment_from_discord(att: &serenity::model::channel::Attachment) -> Attachment {
    Attachment {
        id: att.id.get(),
        filename: att.filename.clone(),
        content_type: att.content_type.clone(),
        url: att.url.clone(),
        size: att.size as u64,
        width: att.width,
        height: att.height,
    }
}

pub fn member_from_user(user: &serenity::model::user::User) -> Member {
    Member {
        member_id: user.id.get(),
        username: user.name.clone(),
        global_name: user.global_name.clone(),
        avatar_url: user.avatar_url(),
        discord_created_at: Some(timestamp_to_utc(&user.created_at())),
        ..Default::default()
    }
}

pub fn member_from_guild_member(m: &serenity::model::guild::Member) -> Member {
    let mut member = member_from_user(&m.user);
    member.server_nick = m.nick.clone();
    member.guild_join_date = m.joined_at.as_ref().map(timestamp_to_utc);
    member.role_ids = m.roles.iter().map(|r| r.get()).collect();
    member
}

fn timestamp_to_utc(ts: &serenity::model::Timestamp) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}
