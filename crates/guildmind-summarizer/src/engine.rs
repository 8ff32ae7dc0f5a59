use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serenity::http::Http;
use serenity::model::id::ChannelId;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use guildmind_core::config::{
    GuildTargets, LlmSettings, CHANNEL_CONCURRENCY, MIN_MESSAGES_FOR_SUMMARY, SUMMARY_CHUNK_SIZE,
    SUMMARY_HOUR_UTC,
};
use guildmind_core::types::{Channel, DailySummary, SummaryStatus};
use guildmind_discord::send::send_chunked;
use guildmind_discord::{threads, RateLimiter};
use guildmind_llm::moderation::ModerationClient;
use guildmind_llm::{ChatMessage, Dispatcher, GenOpts};
use guildmind_store::{records, Store};

use crate::error::SummaryError;
use crate::media_filter;
use crate::parse::{parse_summary_output, SummaryOutput, NO_NEWS};
use crate::post;
use crate::prompts::{self, PromptMessage};
use crate::top_content::{self, ChannelFilter, TopContentParams};

const SUMMARY_MAX_TOKENS: u32 = 8192;

#[derive(Debug, Default)]
pub struct RunReport {
    pub eligible: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub no_news: usize,
    pub aggregate_posted: bool,
}

enum ChannelOutcome {
    Skipped,
    NoNews,
    Completed { items_json: String },
    Failed,
}

/// Scheduled per-channel and aggregate summary generator.
pub struct Summarizer {
    store: Arc<Store>,
    dispatcher: Arc<Dispatcher>,
    moderation: Arc<ModerationClient>,
    http: Arc<Http>,
    rl: Arc<RateLimiter>,
    guild: GuildTargets,
    llm: LlmSettings,
}

impl Summarizer {
    pub fn new(
        store: Arc<Store>,
        dispatcher: Arc<Dispatcher>,
        moderation: Arc<ModerationClient>,
        http: Arc<Http>,
        rl: Arc<RateLimiter>,
        guild: GuildTargets,
        llm: LlmSettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            moderation,
            http,
            rl,
            guild,
            llm,
        }
    }

    /// The 24-hour window for `date`'s run, ending at 07:00 UTC that day.
    pub fn window_for(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = date
            .and_hms_opt(SUMMARY_HOUR_UTC, 0, 0)
            .unwrap_or_default()
            .and_utc();
        (end - Duration::hours(24), end)
    }

    /// Run the full daily pipeline: every eligible channel concurrently
    /// (bounded), then the aggregate once all channels settle. A failure in
    /// one channel never aborts the others.
    pub async fn run_daily(self: &Arc<Self>, date: NaiveDate) -> RunReport {
        let (start, end) = Self::window_for(date);
        info!(%date, %start, %end, "daily summary run starting");

        let channels = match records::monitored_channels(&self.store, &self.guild.channels_to_monitor)
            .await
        {
            Ok(cs) => cs,
            Err(e) => {
                error!(error = %e, "could not load monitored channels");
                return RunReport::default();
            }
        };
        let channels: Vec<Channel> =
            channels.into_iter().filter(|c| !c.is_nsfw_by_name()).collect();

        let mut report = RunReport {
            eligible: 0,
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(CHANNEL_CONCURRENCY));
        let mut handles = Vec::new();

        for channel in channels {
            let this = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                let channel_id = channel.channel_id;
                match this.summarize_channel(&channel, date, start, end).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(channel_id, error = %e, "channel summary failed");
                        this.record_failure(date, channel_id, &e).await;
                        ChannelOutcome::Failed
                    }
                }
            }));
        }

        let mut completed_payloads: Vec<String> = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(ChannelOutcome::Skipped) => report.skipped += 1,
                Ok(ChannelOutcome::NoNews) => {
                    report.eligible += 1;
                    report.no_news += 1;
                }
                Ok(ChannelOutcome::Completed { items_json }) => {
                    report.eligible += 1;
                    report.completed += 1;
                    completed_payloads.push(items_json);
                }
                Ok(ChannelOutcome::Failed) => {
                    report.eligible += 1;
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "channel summary task panicked");
                    report.failed += 1;
                }
            }
        }

        // Aggregate waits on all channel summaries.
        if !completed_payloads.is_empty() {
            match self.post_aggregate_summary(date, &completed_payloads).await {
                Ok(()) => report.aggregate_posted = true,
                Err(e) => error!(error = %e, "aggregate summary failed"),
            }
        }

        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            no_news = report.no_news,
            "daily summary run finished"
        );
        report
    }

    async fn summarize_channel(
        &self,
        channel: &Channel,
        date: NaiveDate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ChannelOutcome, SummaryError> {
        let channel_id = channel.channel_id;

        // Idempotence: one completed row per (date, channel).
        if let Some(existing) = records::get_daily_summary(&self.store, date, channel_id).await? {
            if existing.status == SummaryStatus::Completed {
                info!(channel_id, %date, "summary already completed, skipping");
                return Ok(ChannelOutcome::Skipped);
            }
        }

        let messages = records::messages_in_window(&self.store, channel_id, &start, &end).await?;
        if messages.len() < MIN_MESSAGES_FOR_SUMMARY {
            return Ok(ChannelOutcome::Skipped);
        }
        let message_count = messages.len();
        info!(channel_id, message_count, "channel eligible for summary");

        // Resolve author display names once for the whole window.
        let author_ids: Vec<u64> = messages.iter().map(|m| m.author_id).collect();
        let members = records::members_by_ids(&self.store, &author_ids).await?;
        let prompt_messages: Vec<PromptMessage> = messages
            .iter()
            .map(|m| PromptMessage {
                author_name: members
                    .get(&m.author_id)
                    .map(|mem| mem.display_name().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                created_at: m.created_at,
                content: m.content.clone(),
                reaction_count: m.reaction_count,
                attachments: m
                    .attachments
                    .iter()
                    .map(|a| (a.filename.clone(), a.url.clone()))
                    .collect(),
                message_id: m.message_id,
                channel_id: m.channel_id,
            })
            .collect();

        let combined = match self.generate_chunked(&prompt_messages).await {
            Some(text) => text,
            None => {
                self.post_no_activity(channel_id).await;
                self.record_no_news(date, channel_id).await?;
                return Ok(ChannelOutcome::NoNews);
            }
        };

        // Two attempts at a parseable payload; the second failure is data.
        let mut items = match parse_summary_output(&combined) {
            Ok(SummaryOutput::Items(items)) => items,
            Ok(SummaryOutput::NoNews) => {
                self.post_no_activity(channel_id).await;
                self.record_no_news(date, channel_id).await?;
                return Ok(ChannelOutcome::NoNews);
            }
            Err(_) => {
                warn!(channel_id, "summary output invalid, regenerating once");
                let retry = self.merge(&[combined]).await?;
                match parse_summary_output(&retry) {
                    Ok(SummaryOutput::Items(items)) => items,
                    Ok(SummaryOutput::NoNews) => {
                        self.post_no_activity(channel_id).await;
                        self.record_no_news(date, channel_id).await?;
                        return Ok(ChannelOutcome::NoNews);
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        media_filter::filter_items(&self.moderation, &mut items).await;

        // Posting: monthly thread, date block, channel top content, then
        // the short digest in the channel itself.
        let thread = threads::find_or_create_monthly_thread(
            &self.http,
            &self.rl,
            serenity::model::id::GuildId::new(self.guild.guild_id),
            ChannelId::new(channel_id),
            &channel.name,
            date,
        )
        .await?;
        records::set_channel_summary_thread(&self.store, channel_id, thread.get()).await?;

        post::post_news_block(&self.http, &self.rl, thread, date, self.guild.guild_id, &items)
            .await?;

        let top = top_content::select_top(
            &self.store,
            &TopContentParams {
                start,
                end,
                filter: ChannelFilter::Single(channel_id),
                min_unique_reactors: top_content::DEFAULT_MIN_REACTORS,
                limit: top_content::DEFAULT_LIMIT,
            },
        )
        .await?;
        top_content::post_top_generations_in_thread(&self.store, &self.http, &self.rl, thread, &top)
            .await?;

        let items_json = serde_json::to_string(&items).map_err(|e| {
            SummaryError::InvalidOutput {
                reason: e.to_string(),
                raw: String::new(),
            }
        })?;

        let short = self.generate_short(&items_json, message_count).await;
        post::post_short_summary(
            &self.http,
            &self.rl,
            ChannelId::new(channel_id),
            self.guild.guild_id,
            thread.get(),
            &short,
        )
        .await?;

        records::upsert_daily_summary(
            &self.store,
            &DailySummary {
                date,
                channel_id,
                full_summary: Some(items_json.clone()),
                short_summary: Some(short),
                thread_id: Some(thread.get()),
                status: SummaryStatus::Completed,
                error: None,
            },
        )
        .await?;

        Ok(ChannelOutcome::Completed { items_json })
    }

    /// Chunked generation over the window: 1000 messages per prompt, later
    /// chunks carry earlier outputs as do-not-duplicate context. Returns
    /// `None` when nothing significant surfaced.
    async fn generate_chunked(&self, messages: &[PromptMessage]) -> Option<String> {
        let mut chunk_outputs: Vec<String> = Vec::new();
        let mut prior: Option<String> = None;
        let total_chunks = messages.len().div_ceil(SUMMARY_CHUNK_SIZE);

        for (i, chunk) in messages.chunks(SUMMARY_CHUNK_SIZE).enumerate() {
            info!(chunk = i + 1, total_chunks, "summarizing chunk");
            let mut prompt = prompts::format_messages(chunk);
            if let Some(ref p) = prior {
                prompt = prompts::with_prior_context(p, &prompt);
            }

            match self
                .dispatcher
                .generate(
                    "claude",
                    &self.llm.summary_model,
                    &prompts::news_system_prompt(),
                    vec![ChatMessage::user(prompt)],
                    GenOpts::max_tokens(SUMMARY_MAX_TOKENS),
                )
                .await
            {
                Ok(text) => {
                    if !matches!(parse_summary_output(&text), Ok(SummaryOutput::NoNews)) {
                        prior = Some(match prior {
                            Some(p) => format!("{p}\n\n{text}"),
                            None => text.clone(),
                        });
                        chunk_outputs.push(text);
                    }
                }
                Err(e) => {
                    // One bad chunk must not sink the channel.
                    warn!(chunk = i + 1, error = %e, "chunk generation failed");
                }
            }
        }

        match chunk_outputs.len() {
            0 => None,
            1 => chunk_outputs.into_iter().next(),
            _ => self.merge(&chunk_outputs).await.ok(),
        }
    }

    async fn merge(&self, summaries: &[String]) -> Result<String, SummaryError> {
        let prompt = prompts::merge_prompt(summaries);
        Ok(self
            .dispatcher
            .generate(
                "claude",
                &self.llm.summary_model,
                "",
                vec![ChatMessage::user(prompt)],
                GenOpts::max_tokens(SUMMARY_MAX_TOKENS),
            )
            .await?)
    }

    async fn generate_short(&self, full_summary: &str, message_count: usize) -> String {
        let prompt = prompts::short_summary_prompt(full_summary, message_count);
        match self
            .dispatcher
            .generate(
                "claude",
                &self.llm.short_summary_model,
                "",
                vec![ChatMessage::user(prompt)],
                GenOpts::max_tokens(SUMMARY_MAX_TOKENS),
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "short summary generation failed");
                prompts::short_summary_fallback(message_count)
            }
        }
    }

    async fn post_aggregate_summary(
        &self,
        date: NaiveDate,
        payloads: &[String],
    ) -> Result<(), SummaryError> {
        let merged = self.merge(payloads).await?;
        let items = match parse_summary_output(&merged) {
            Ok(SummaryOutput::Items(items)) => items,
            Ok(SummaryOutput::NoNews) => return Ok(()),
            Err(_) => {
                let retry = self.merge(payloads).await?;
                match parse_summary_output(&retry)? {
                    SummaryOutput::Items(items) => items,
                    SummaryOutput::NoNews => return Ok(()),
                }
            }
        };

        post::post_aggregate(
            &self.http,
            &self.rl,
            ChannelId::new(self.guild.summary_channel_id),
            date,
            self.guild.guild_id,
            &items,
        )
        .await?;

        // Server-wide top generations follow the aggregate, excluding the
        // art channel, into the dedicated channel when one is configured.
        let (start, end) = Self::window_for(date);
        let top = top_content::select_top(
            &self.store,
            &TopContentParams {
                start,
                end,
                filter: ChannelFilter::Monitored {
                    monitor_ids: self.guild.channels_to_monitor.clone(),
                    exclude_art: self.guild.art_channel_id,
                },
                min_unique_reactors: top_content::DEFAULT_MIN_REACTORS,
                limit: top_content::DEFAULT_LIMIT,
            },
        )
        .await?;
        let top_target = self
            .guild
            .top_gens_channel_id
            .unwrap_or(self.guild.summary_channel_id);
        top_content::post_top_generations(
            &self.store,
            &self.http,
            &self.rl,
            ChannelId::new(top_target),
            &top,
            false,
            date,
        )
        .await?;

        Ok(())
    }

    /// The user-visible floor: a channel that produced nothing still gets a
    /// single line, never silence.
    async fn post_no_activity(&self, channel_id: u64) {
        if let Err(e) = send_chunked(
            &self.http,
            &self.rl,
            ChannelId::new(channel_id),
            "No significant activity in the last 24 hours.",
        )
        .await
        {
            warn!(channel_id, error = %e, "no-activity notice failed to send");
        }
    }

    async fn record_no_news(
        &self,
        date: NaiveDate,
        channel_id: u64,
    ) -> Result<(), SummaryError> {
        records::upsert_daily_summary(
            &self.store,
            &DailySummary {
                date,
                channel_id,
                full_summary: Some(NO_NEWS.to_string()),
                short_summary: None,
                thread_id: None,
                status: SummaryStatus::Completed,
                error: None,
            },
        )
        .await?;
        Ok(())
    }

    async fn record_failure(&self, date: NaiveDate, channel_id: u64, e: &SummaryError) {
        let error_text = match e {
            SummaryError::InvalidOutput { reason, raw } => format!("{reason}: {raw}"),
            other => other.to_string(),
        };
        let row = DailySummary {
            date,
            channel_id,
            full_summary: None,
            short_summary: None,
            thread_id: None,
            status: SummaryStatus::Failed,
            error: Some(error_text),
        };
        if let Err(store_err) = records::upsert_daily_summary(&self.store, &row).await {
            error!(channel_id, error = %store_err, "failed to record summary failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_is_anchored_at_seven_utc() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        let (start, end) = Summarizer::window_for(date);
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 11, 7, 0, 0).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 10, 7, 0, 0).unwrap());
    }

    #[test]
    fn eligibility_boundary_is_twenty_five_messages() {
        assert!(25 >= MIN_MESSAGES_FOR_SUMMARY);
        assert!(24 < MIN_MESSAGES_FOR_SUMMARY);
    }
}
