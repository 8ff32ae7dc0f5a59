use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{GuildmindError, Result};

pub const DEFAULT_HEALTH_PORT: u16 = 8080;
pub const SUMMARY_HOUR_UTC: u32 = 7;
pub const MIN_MESSAGES_FOR_SUMMARY: usize = 25;
pub const SUMMARY_CHUNK_SIZE: usize = 1000;
pub const CHANNEL_CONCURRENCY: usize = 4;
/// Wall timeout for consent dialogs and comment prompts: 6 hours.
pub const DIALOG_TIMEOUT_SECS: u64 = 6 * 60 * 60;

/// Raw environment surface. Keys are the documented flat variable names
/// (`GUILD_ID`, `BOT_TOKEN`, ...) merged over an optional `guildmind.toml`.
/// `DEV_MODE` arrives as `true`, `1` or `"yes"` depending on the deploy;
/// all truthy spellings are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FlexBool {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FlexBool {
    fn truthy(&self) -> bool {
        match self {
            FlexBool::Bool(b) => *b,
            FlexBool::Int(i) => *i != 0,
            FlexBool::Text(s) => matches!(
                s.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    dev_mode: Option<FlexBool>,
    #[serde(default)]
    log_level: Option<String>,

    #[serde(default)]
    guild_id: Option<u64>,
    #[serde(default)]
    dev_guild_id: Option<u64>,
    #[serde(default)]
    summary_channel_id: Option<u64>,
    #[serde(default)]
    dev_summary_channel_id: Option<u64>,
    #[serde(default)]
    channels_to_monitor: Option<String>,
    #[serde(default)]
    dev_channels_to_monitor: Option<String>,
    #[serde(default)]
    art_channel_id: Option<u64>,
    #[serde(default)]
    top_gens_id: Option<u64>,
    #[serde(default)]
    admin_user_id: Option<u64>,

    #[serde(default)]
    bot_token: Option<String>,
    #[serde(default)]
    anthropic_api_key: Option<String>,
    #[serde(default)]
    openai_api_key: Option<String>,
    #[serde(default)]
    gemini_api_key: Option<String>,
    #[serde(default)]
    supabase_url: Option<String>,
    #[serde(default)]
    supabase_service_key: Option<String>,
    #[serde(default)]
    moderation_api_key: Option<String>,

    #[serde(default)]
    health_port: Option<u16>,
    #[serde(default)]
    sqlite_path: Option<String>,
    #[serde(default)]
    media_dir: Option<String>,
    #[serde(default)]
    share_emoji: Option<String>,
    #[serde(default)]
    curator_emoji: Option<String>,
    #[serde(default)]
    x_publisher_url: Option<String>,
    #[serde(default)]
    instagram_publisher_url: Option<String>,
    #[serde(default)]
    tiktok_publisher_url: Option<String>,
    #[serde(default)]
    youtube_publisher_url: Option<String>,
}

/// Resolved runtime configuration. The dev/prod id sets have already been
/// selected; components never look at `DEV_*` names themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildmindConfig {
    pub dev_mode: bool,
    pub log_level: Option<String>,
    pub guild: GuildTargets,
    pub discord: DiscordSettings,
    pub store: StoreSettings,
    pub llm: LlmSettings,
    pub moderation: ModerationSettings,
    pub publishers: PublisherSettings,
    pub health_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildTargets {
    pub guild_id: u64,
    pub summary_channel_id: u64,
    /// Channel or category ids; categories expand to their child channels.
    pub channels_to_monitor: Vec<u64>,
    pub art_channel_id: Option<u64>,
    pub top_gens_channel_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordSettings {
    pub bot_token: String,
    pub admin_user_id: u64,
    /// Reaction emoji that triggers the sharing flow.
    pub share_emoji: String,
    /// Reaction emoji that triggers workflow curation.
    pub curator_emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,
    pub sqlite_path: String,
    pub media_dir: String,
}

impl StoreSettings {
    pub fn use_remote(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_service_key.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub summary_model: String,
    pub short_summary_model: String,
    pub agent_model: String,
    /// Moderation model on the first-ask consent path.
    pub moderation_model_consent: String,
    /// Higher-quality moderation model on the pre-approved path.
    pub moderation_model_preapproved: String,
    pub classify_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationSettings {
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublisherSettings {
    pub x_url: Option<String>,
    pub instagram_url: Option<String>,
    pub tiktok_url: Option<String>,
    pub youtube_url: Option<String>,
}

impl GuildmindConfig {
    /// Load config from an optional TOML file with flat env overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or("guildmind.toml");
        let raw: RawConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::raw())
            .extract()
            .map_err(|e| GuildmindError::Config(e.to_string()))?;
        Self::resolve(raw)
    }

    fn resolve(raw: RawConfig) -> Result<Self> {
        let dev_mode = raw.dev_mode.as_ref().map(FlexBool::truthy).unwrap_or(false);

        let (guild_id, summary_channel_id, monitor_str) = if dev_mode {
            (
                raw.dev_guild_id.or(raw.guild_id),
                raw.dev_summary_channel_id.or(raw.summary_channel_id),
                raw.dev_channels_to_monitor
                    .clone()
                    .or(raw.channels_to_monitor.clone()),
            )
        } else {
            (
                raw.guild_id,
                raw.summary_channel_id,
                raw.channels_to_monitor.clone(),
            )
        };

        let guild_id =
            guild_id.ok_or_else(|| GuildmindError::Config("GUILD_ID not set".into()))?;
        let summary_channel_id = summary_channel_id
            .ok_or_else(|| GuildmindError::Config("SUMMARY_CHANNEL_ID not set".into()))?;
        let channels_to_monitor = parse_id_list(monitor_str.as_deref().unwrap_or(""))?;
        if channels_to_monitor.is_empty() {
            return Err(GuildmindError::Config(
                "CHANNELS_TO_MONITOR is empty".into(),
            ));
        }

        let bot_token = raw
            .bot_token
            .ok_or_else(|| GuildmindError::Config("BOT_TOKEN not set".into()))?;
        let admin_user_id = raw
            .admin_user_id
            .ok_or_else(|| GuildmindError::Config("ADMIN_USER_ID not set".into()))?;

        Ok(Self {
            dev_mode,
            log_level: raw.log_level,
            guild: GuildTargets {
                guild_id,
                summary_channel_id,
                channels_to_monitor,
                art_channel_id: raw.art_channel_id,
                top_gens_channel_id: raw.top_gens_id,
            },
            discord: DiscordSettings {
                bot_token,
                admin_user_id,
                share_emoji: raw.share_emoji.unwrap_or_else(|| "🐦".to_string()),
                curator_emoji: raw.curator_emoji.unwrap_or_else(|| "🗃️".to_string()),
            },
            store: StoreSettings {
                supabase_url: raw.supabase_url,
                supabase_service_key: raw.supabase_service_key,
                sqlite_path: raw
                    .sqlite_path
                    .unwrap_or_else(|| "guildmind.db".to_string()),
                media_dir: raw.media_dir.unwrap_or_else(|| "media".to_string()),
            },
            llm: LlmSettings {
                anthropic_api_key: raw.anthropic_api_key,
                openai_api_key: raw.openai_api_key,
                gemini_api_key: raw.gemini_api_key,
                summary_model: "claude-3-5-sonnet-latest".to_string(),
                short_summary_model: "claude-3-5-haiku-latest".to_string(),
                agent_model: "claude-sonnet-4-20250514".to_string(),
                moderation_model_consent: "claude-3-5-haiku-latest".to_string(),
                moderation_model_preapproved: "claude-3-5-sonnet-latest".to_string(),
                classify_model: "claude-3-5-haiku-latest".to_string(),
            },
            moderation: ModerationSettings {
                api_key: raw.moderation_api_key,
                base_url: "https://api.sightengine.com".to_string(),
            },
            publishers: PublisherSettings {
                x_url: raw.x_publisher_url,
                instagram_url: raw.instagram_publisher_url,
                tiktok_url: raw.tiktok_publisher_url,
                youtube_url: raw.youtube_publisher_url,
            },
            health_port: raw.health_port.unwrap_or(DEFAULT_HEALTH_PORT),
        })
    }
}

fn parse_id_list(s: &str) -> Result<Vec<u64>> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<u64>()
                .map_err(|_| GuildmindError::Config(format!("invalid id in channel list: {p}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_raw() -> RawConfig {
        RawConfig {
            guild_id: Some(1),
            summary_channel_id: Some(2),
            channels_to_monitor: Some("10, 11,12".into()),
            dev_guild_id: Some(100),
            dev_summary_channel_id: Some(200),
            dev_channels_to_monitor: Some("500".into()),
            bot_token: Some("token".into()),
            admin_user_id: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn prod_mode_uses_prod_ids() {
        let cfg = GuildmindConfig::resolve(base_raw()).unwrap();
        assert_eq!(cfg.guild.guild_id, 1);
        assert_eq!(cfg.guild.channels_to_monitor, vec![10, 11, 12]);
    }

    #[test]
    fn dev_mode_switches_id_set() {
        let mut raw = base_raw();
        raw.dev_mode = Some(FlexBool::Bool(true));
        let cfg = GuildmindConfig::resolve(raw).unwrap();
        assert_eq!(cfg.guild.guild_id, 100);
        assert_eq!(cfg.guild.summary_channel_id, 200);
        assert_eq!(cfg.guild.channels_to_monitor, vec![500]);
    }

    #[test]
    fn missing_token_is_config_error() {
        let mut raw = base_raw();
        raw.bot_token = None;
        assert!(matches!(
            GuildmindConfig::resolve(raw),
            Err(GuildmindError::Config(_))
        ));
    }

    #[test]
    fn bad_channel_list_rejected() {
        let mut raw = base_raw();
        raw.channels_to_monitor = Some("10,abc".into());
        assert!(GuildmindConfig::resolve(raw).is_err());
    }

    #[test]
    fn dev_mode_accepts_truthy_spellings() {
        for (raw, expected) in [
            (FlexBool::Bool(true), true),
            (FlexBool::Int(1), true),
            (FlexBool::Int(0), false),
            (FlexBool::Text("yes".into()), true),
            (FlexBool::Text("false".into()), false),
        ] {
            assert_eq!(raw.truthy(), expected);
        }
    }
}
