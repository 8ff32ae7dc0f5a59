use std::sync::Arc;

use clap::Parser;
use serenity::prelude::GatewayIntents;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod alerts;
mod handler;
mod http;
mod logsink;
mod scheduler;

use guildmind_agent::{AgentContext, AgentRunner};
use guildmind_core::config::GuildmindConfig;
use guildmind_curator::Curator;
use guildmind_discord::{ConnectionMonitor, RateLimiter};
use guildmind_indexer::Indexer;
use guildmind_llm::moderation::ModerationClient;
use guildmind_llm::Dispatcher;
use guildmind_share::publisher::publishers_from_settings;
use guildmind_share::{DialogRegistry, ShareFlow};
use guildmind_store::Store;
use guildmind_summarizer::Summarizer;

/// Gateway event fan-out queue depth; when full, receipt slows down and
/// backpressure reaches the socket.
const EVENT_QUEUE_DEPTH: usize = 512;
/// Shard latency sampling cadence.
const LATENCY_SAMPLE_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(name = "guildmind-daemon", about = "Discord community intelligence daemon")]
struct Args {
    /// Path to guildmind.toml (env vars override file values).
    #[arg(long)]
    config: Option<String>,

    /// One-shot backfill instead of the daemon loop:
    /// `<channel_id>,<start-rfc3339>,<end-rfc3339>`.
    #[arg(long)]
    backfill: Option<String>,
}

fn parse_backfill(spec: &str) -> anyhow::Result<(u64, chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> {
    let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        anyhow::bail!("expected <channel_id>,<start>,<end>");
    }
    let channel_id: u64 = parts[0].parse()?;
    let start = chrono::DateTime::parse_from_rfc3339(parts[1])?.with_timezone(&chrono::Utc);
    let end = chrono::DateTime::parse_from_rfc3339(parts[2])?.with_timezone(&chrono::Utc);
    Ok((channel_id, start, end))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = GuildmindConfig::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("config load failed: {e}"))?;

    let default_filter = match (&config.log_level, config.dev_mode) {
        (Some(level), _) => format!("guildmind={level}"),
        (None, true) => "guildmind=debug".to_string(),
        (None, false) => "guildmind=info".to_string(),
    };
    let (store_layer, syslog_slot) = logsink::StoreLogLayer::new();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(store_layer)
        .init();

    info!(dev_mode = config.dev_mode, "guildmind starting");

    // Storage port: remote when Supabase credentials exist, local SQLite
    // otherwise. The system log sink comes up with it.
    let store = Arc::new(
        Store::open(&config.store)
            .await
            .map_err(|e| anyhow::anyhow!("store open failed: {e}"))?,
    );
    let _ = syslog_slot.set(guildmind_store::syslog::spawn_writer(Arc::clone(&store)));

    let dispatcher = Arc::new(Dispatcher::from_settings(&config.llm));
    let moderation = Arc::new(ModerationClient::from_settings(&config.moderation));
    let rl = Arc::new(RateLimiter::new());
    let (monitor, _ready_rx) = ConnectionMonitor::new();
    let monitor = Arc::new(monitor);
    let registry = DialogRegistry::new();

    // serenity owns the socket; deps that need its Http are wired after
    // the client exists, through the handler's deferred slot.
    let (gateway_handler, deps_slot) = handler::GatewayHandler::new();
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let mut client = serenity::Client::builder(&config.discord.bot_token, intents)
        .event_handler(gateway_handler)
        .await?;

    let http = Arc::clone(&client.http);

    // One-shot backfill mode: page the channel's history into the store,
    // then exit without touching the gateway.
    if let Some(ref spec) = args.backfill {
        let (channel_id, start, end) = parse_backfill(spec)?;
        let report = guildmind_indexer::backfill::backfill_channel(
            &store,
            &http,
            &rl,
            config.guild.guild_id,
            channel_id,
            start,
            end,
        )
        .await
        .map_err(|e| anyhow::anyhow!("backfill failed: {e}"))?;
        info!(indexed = report.indexed, "backfill finished");
        return Ok(());
    }

    let alerts_tx = alerts::spawn_alert_sink(
        Arc::clone(&http),
        Arc::clone(&rl),
        config.discord.admin_user_id,
    );

    let indexer = Arc::new(Indexer::new(
        Arc::clone(&store),
        Arc::clone(&http),
        Arc::clone(&rl),
        config.guild.guild_id,
        alerts_tx.clone(),
    ));
    let (event_tx, event_rx) = tokio::sync::mpsc::channel(EVENT_QUEUE_DEPTH);
    tokio::spawn(Arc::clone(&indexer).run(event_rx));

    let share = Arc::new(ShareFlow::new(
        Arc::clone(&store),
        Arc::clone(&dispatcher),
        Arc::clone(&registry),
        publishers_from_settings(&config.publishers),
        Arc::clone(&http),
        Arc::clone(&rl),
        config.llm.clone(),
        config.discord.clone(),
        config.guild.guild_id,
    ));
    let curator = Arc::new(Curator::new(
        Arc::clone(&store),
        Arc::clone(&dispatcher),
        Arc::clone(&registry),
        Arc::clone(&http),
        Arc::clone(&rl),
        config.llm.clone(),
    ));
    let agent_ctx = Arc::new(AgentContext {
        store: Arc::clone(&store),
        http: Arc::clone(&http),
        rl: Arc::clone(&rl),
        share: Arc::clone(&share),
        monitor: Arc::clone(&monitor),
        guild_id: config.guild.guild_id,
    });
    let agent = Arc::new(AgentRunner::new(
        Arc::clone(&dispatcher),
        agent_ctx,
        config.llm.agent_model.clone(),
    ));

    let deps = Arc::new(handler::HandlerDeps {
        monitor: Arc::clone(&monitor),
        registry: Arc::clone(&registry),
        indexer: Arc::clone(&indexer),
        share,
        curator,
        agent,
        rl: Arc::clone(&rl),
        event_tx,
        guild_id: config.guild.guild_id,
        admin_user_id: config.discord.admin_user_id,
        share_emoji: config.discord.share_emoji.clone(),
        curator_emoji: config.discord.curator_emoji.clone(),
    });
    if deps_slot.set(deps).is_err() {
        warn!("handler deps were already set");
    }

    // Scheduler: the daily summary clock and the six-hourly health sweep.
    let summarizer = Arc::new(Summarizer::new(
        Arc::clone(&store),
        Arc::clone(&dispatcher),
        Arc::clone(&moderation),
        Arc::clone(&http),
        Arc::clone(&rl),
        config.guild.clone(),
        config.llm.clone(),
    ));
    tokio::spawn(scheduler::daily_summary_loop(
        Arc::clone(&summarizer),
        Arc::clone(&store),
        Arc::clone(&http),
        Arc::clone(&rl),
    ));
    tokio::spawn(scheduler::health_check_loop(
        Arc::clone(&store),
        alerts_tx.clone(),
    ));

    // Liveness probes for external supervisors.
    let probe_monitor = Arc::clone(&monitor);
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = http::serve(probe_monitor, health_port).await {
            error!(error = %e, "health server exited");
        }
    });

    // Heartbeat sampling from the shard runners feeds the monitor; the
    // monitor never reconnects on its own.
    let shard_manager = Arc::clone(&client.shard_manager);
    let sample_monitor = Arc::clone(&monitor);
    tokio::spawn(async move {
        let mut tick =
            tokio::time::interval(std::time::Duration::from_secs(LATENCY_SAMPLE_SECS));
        loop {
            tick.tick().await;
            let runners = shard_manager.runners.lock().await;
            for runner in runners.values() {
                if matches!(
                    runner.stage,
                    serenity::gateway::ConnectionStage::Connected
                ) {
                    sample_monitor.record_heartbeat(runner.latency);
                }
            }
            drop(runners);
            sample_monitor.is_healthy();
        }
    });

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shard_manager.shutdown_all().await;
        }
    });

    // Authentication failure is fatal: exit and let the supervisor restart.
    if let Err(e) = client.start().await {
        if matches!(
            e,
            serenity::Error::Gateway(serenity::gateway::GatewayError::InvalidAuthentication)
        ) {
            error!("gateway authentication failed (invalid token), shutting down");
            std::process::exit(1);
        }
        return Err(e.into());
    }

    Ok(())
}
