use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Canonical link to a Discord message, usable from any other post.
pub fn jump_url(guild_id: u64, channel_id: u64, message_id: u64) -> String {
    format!("https://discord.com/channels/{guild_id}/{channel_id}/{message_id}")
}

/// Store timestamp format: ISO-8601 with `Z` suffix, microsecond precision.
/// Fixed width keeps lexicographic and chronological order identical.
pub fn iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// A single file attached to a message. URLs are ephemeral CDN tokens and
/// may expire; consumers needing a live link go through the indexer's
/// refresh operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(with = "u64_string")]
    pub id: u64,
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl Attachment {
    pub fn is_video(&self) -> bool {
        let name = self.filename.to_lowercase();
        name.ends_with(".mp4") || name.ends_with(".mov") || name.ends_with(".webm")
    }

    pub fn is_image(&self) -> bool {
        let name = self.filename.to_lowercase();
        [".png", ".jpg", ".jpeg", ".gif", ".webp"]
            .iter()
            .any(|ext| name.ends_with(ext))
    }
}

/// One indexed guild message. Rows are tombstoned (`is_deleted`), never
/// hard-deleted, so summary payloads referencing them can dangle safely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(with = "u64_string")]
    pub message_id: u64,
    #[serde(with = "u64_string")]
    pub channel_id: u64,
    #[serde(with = "u64_string")]
    pub author_id: u64,
    pub content: String,
    #[serde(with = "ts_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "ts_utc_opt")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub embeds: Vec<serde_json::Value>,
    #[serde(default)]
    pub reaction_count: u32,
    /// Unique reactor ids, bot excluded. Serialized as strings so the JSON
    /// column is portable across integer widths.
    #[serde(default, with = "u64_string_set")]
    pub reactors: BTreeSet<u64>,
    #[serde(default, with = "u64_string_opt")]
    pub reference_id: Option<u64>,
    #[serde(default, with = "u64_string_opt")]
    pub thread_id: Option<u64>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub jump_url: String,
    #[serde(with = "ts_utc")]
    pub indexed_at: DateTime<Utc>,
}

impl Message {
    pub fn unique_reactor_count(&self) -> usize {
        self.reactors.len()
    }

    pub fn first_video_url(&self) -> Option<&str> {
        self.attachments
            .iter()
            .find(|a| a.is_video())
            .map(|a| a.url.as_str())
    }
}

/// A guild member and their durable preferences. Preference fields are
/// mutated only by the member through DM interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    #[serde(with = "u64_string")]
    pub member_id: u64,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub server_nick: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, with = "ts_utc_opt")]
    pub discord_created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "ts_utc_opt")]
    pub guild_join_date: Option<DateTime<Utc>>,
    #[serde(default, with = "u64_string_vec")]
    pub role_ids: Vec<u64>,
    /// Tri-state: None = never asked, Some(true/false) = recorded answer.
    #[serde(default)]
    pub sharing_consent: Option<bool>,
    /// Whether consent DMs may be sent at all. Defaults to true.
    #[serde(default = "bool_true")]
    pub dm_preference: bool,
    #[serde(default)]
    pub permission_to_curate: Option<bool>,
    #[serde(default)]
    pub notifications: Vec<String>,
    #[serde(default)]
    pub twitter_handle: Option<String>,
    #[serde(default)]
    pub instagram_handle: Option<String>,
    #[serde(default)]
    pub youtube_handle: Option<String>,
}

impl Default for Member {
    fn default() -> Self {
        Self {
            member_id: 0,
            username: String::new(),
            global_name: None,
            server_nick: None,
            avatar_url: None,
            discord_created_at: None,
            guild_join_date: None,
            role_ids: Vec::new(),
            sharing_consent: None,
            // Consent DMs are allowed until the member opts out.
            dm_preference: true,
            permission_to_curate: None,
            notifications: Vec::new(),
            twitter_handle: None,
            instagram_handle: None,
            youtube_handle: None,
        }
    }
}

impl Member {
    /// Display-name resolution order used everywhere posts credit a member.
    pub fn display_name(&self) -> &str {
        self.server_nick
            .as_deref()
            .or(self.global_name.as_deref())
            .unwrap_or(&self.username)
    }
}

fn bool_true() -> bool {
    true
}

/// A guild channel as observed from the gateway, plus curator metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Channel {
    #[serde(with = "u64_string")]
    pub channel_id: u64,
    pub name: String,
    #[serde(default, with = "u64_string_opt")]
    pub category_id: Option<u64>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub suitable_posts: Option<String>,
    #[serde(default)]
    pub unsuitable_posts: Option<String>,
    #[serde(default)]
    pub rules: Option<String>,
    #[serde(default)]
    pub setup_complete: bool,
    #[serde(default)]
    pub enriched: bool,
    #[serde(default, with = "u64_string_opt")]
    pub summary_thread_id: Option<u64>,
}

impl Channel {
    /// Channels named anything-nsfw are excluded from summaries and sharing.
    pub fn is_nsfw_by_name(&self) -> bool {
        self.name.to_lowercase().contains("nsfw")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryStatus::Pending => write!(f, "pending"),
            SummaryStatus::Completed => write!(f, "completed"),
            SummaryStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SummaryStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SummaryStatus::Pending),
            "completed" => Ok(SummaryStatus::Completed),
            "failed" => Ok(SummaryStatus::Failed),
            other => Err(format!("unknown summary status: {other}")),
        }
    }
}

/// One day's summary run for one channel. At most one `completed` row may
/// exist per `(date, channel_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    #[serde(with = "u64_string")]
    pub channel_id: u64,
    #[serde(default)]
    pub full_summary: Option<String>,
    #[serde(default)]
    pub short_summary: Option<String>,
    #[serde(default, with = "u64_string_opt")]
    pub thread_id: Option<u64>,
    pub status: SummaryStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Append-only system log row mirrored from tracing WARN/ERROR events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLogRow {
    #[serde(with = "ts_utc")]
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub logger_name: String,
    pub message: String,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Value,
    pub hostname: String,
}

pub mod ts_utc {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::iso(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

pub mod ts_utc_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => s.serialize_some(&super::iso(dt)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}

// Serde adapters: Discord snowflakes travel as strings in JSON columns so
// consumers in other languages never hit integer-width trouble.

pub mod u64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Text(String),
        }
        match Raw::deserialize(d)? {
            Raw::Num(n) => Ok(n),
            Raw::Text(t) => t.parse().map_err(serde::de::Error::custom),
        }
    }
}

pub mod u64_string_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(n) => s.serialize_some(&n.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Text(String),
        }
        let raw: Option<Raw> = Option::deserialize(d)?;
        match raw {
            None => Ok(None),
            Some(Raw::Num(n)) => Ok(Some(n)),
            Some(Raw::Text(t)) if t.is_empty() => Ok(None),
            Some(Raw::Text(t)) => t.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

pub mod u64_string_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u64], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(v.iter().map(|n| n.to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Text(String),
        }
        let raw: Vec<Raw> = Vec::deserialize(d)?;
        raw.into_iter()
            .map(|r| match r {
                Raw::Num(n) => Ok(n),
                Raw::Text(t) => t.parse().map_err(serde::de::Error::custom),
            })
            .collect()
    }
}

pub mod u64_string_set {
    use serde::{Deserializer, Serializer};
    use std::collections::BTreeSet;

    pub fn serialize<S: Serializer>(v: &BTreeSet<u64>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(v.iter().map(|n| n.to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeSet<u64>, D::Error> {
        let v = super::u64_string_vec::deserialize(d)?;
        Ok(v.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reactors_serialize_as_strings() {
        let mut msg = Message {
            message_id: 1,
            channel_id: 2,
            author_id: 3,
            content: "hi".into(),
            created_at: Utc::now(),
            edited_at: None,
            attachments: vec![],
            embeds: vec![],
            reaction_count: 2,
            reactors: BTreeSet::new(),
            reference_id: None,
            thread_id: None,
            is_pinned: false,
            is_deleted: false,
            jump_url: jump_url(9, 2, 1),
            indexed_at: Utc::now(),
        };
        msg.reactors.insert(42);
        msg.reactors.insert(7);

        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["reactors"], serde_json::json!(["7", "42"]));
        assert_eq!(v["message_id"], "1");

        let back: Message = serde_json::from_value(v).unwrap();
        assert_eq!(back.reactors.len(), 2);
        assert!(back.reactors.contains(&42));
    }

    #[test]
    fn display_name_prefers_nick_then_global() {
        let mut m = Member {
            member_id: 1,
            username: "user".into(),
            ..Default::default()
        };
        assert_eq!(m.display_name(), "user");
        m.global_name = Some("Global".into());
        assert_eq!(m.display_name(), "Global");
        m.server_nick = Some("Nick".into());
        assert_eq!(m.display_name(), "Nick");
    }

    #[test]
    fn video_attachment_detection() {
        let att = Attachment {
            id: 1,
            filename: "Clip.MP4".into(),
            content_type: None,
            url: "u".into(),
            size: 0,
            width: None,
            height: None,
        };
        assert!(att.is_video());
        assert!(!att.is_image());
    }

    #[test]
    fn jump_url_shape() {
        assert_eq!(
            jump_url(1, 2, 3),
            "https://discord.com/channels/1/2/3"
        );
    }
}
