use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate, Timelike, Utc};
use serenity::http::Http;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use guildmind_core::config::SUMMARY_HOUR_UTC;
use guildmind_discord::RateLimiter;
use guildmind_store::{records, Store};
use guildmind_summarizer::Summarizer;

/// Health sweep cadence.
const HEALTH_INTERVAL_SECS: u64 = 6 * 60 * 60;
/// The daily-summary check only fires after this UTC hour.
const SUMMARY_CHECK_HOUR: u32 = 8;
/// URL refresh shortlist: the month's most-reacted media posts.
const REFRESH_WINDOW_DAYS: i64 = 30;
const REFRESH_MIN_REACTORS: usize = 3;
const REFRESH_LIMIT: usize = 25;

/// Wake at 07:00 UTC every day: refresh the month's top media URLs (CDN
/// tokens expire), then run the summarizer for that date.
pub async fn daily_summary_loop(
    summarizer: Arc<Summarizer>,
    store: Arc<Store>,
    http: Arc<Http>,
    rl: Arc<RateLimiter>,
) {
    loop {
        let now = Utc::now();
        let today_run = now
            .date_naive()
            .and_hms_opt(SUMMARY_HOUR_UTC, 0, 0)
            .unwrap_or_default()
            .and_utc();
        let next_run = if today_run > now {
            today_run
        } else {
            today_run + ChronoDuration::days(1)
        };

        let wait = (next_run - now)
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(60));
        info!(next_run = %next_run, "daily summary scheduled");
        tokio::time::sleep(wait).await;

        let run_start = Utc::now();
        if let Err(e) = guildmind_indexer::refresh::refresh_top_media(
            &store,
            &http,
            &rl,
            run_start - ChronoDuration::days(REFRESH_WINDOW_DAYS),
            run_start,
            REFRESH_MIN_REACTORS,
            REFRESH_LIMIT,
        )
        .await
        {
            warn!(error = %e, "pre-summary media refresh failed");
        }

        let date = next_run.date_naive();
        let report = summarizer.run_daily(date).await;
        info!(
            %date,
            completed = report.completed,
            failed = report.failed,
            "scheduled summary run done"
        );
    }
}

/// Every six hours, run the independent health checks and coalesce any
/// findings into one admin alert batch.
pub async fn health_check_loop(store: Arc<Store>, alerts: mpsc::Sender<String>) {
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(HEALTH_INTERVAL_SECS));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick fires immediately; skip it so startup isn't noisy.
    tick.tick().await;

    loop {
        tick.tick().await;
        let findings = run_health_checks(&store, Utc::now().date_naive()).await;
        for finding in findings {
            if alerts.send(finding).await.is_err() {
                error!("alert sink is gone, stopping health checks");
                return;
            }
        }
    }
}

/// The three independent checks: recent ingestion, live reactions, and
/// today's completed summary (after 08:00 UTC only).
pub async fn run_health_checks(store: &Arc<Store>, today: NaiveDate) -> Vec<String> {
    let mut findings = Vec::new();
    let now = Utc::now();

    let indexed_6h = match records::messages_indexed_since_count(
        store,
        &(now - ChronoDuration::hours(6)),
    )
    .await
    {
        Ok(n) => n,
        Err(e) => {
            findings.push(format!("Health check could not query the store: {e}"));
            return findings;
        }
    };
    if indexed_6h == 0 {
        findings.push("No messages indexed in the last 6 hours".to_string());
    }

    // Reaction silence only matters while ingestion is flowing; a dead
    // gateway is already covered by the first check.
    if indexed_6h > 0 {
        match records::any_reactions_since(store, &(now - ChronoDuration::hours(24))).await {
            Ok(false) => {
                findings.push("No reactions recorded in the last 24 hours".to_string())
            }
            Ok(true) => {}
            Err(e) => findings.push(format!("Reaction health check failed: {e}")),
        }
    }

    if now.hour() >= SUMMARY_CHECK_HOUR {
        match records::any_completed_summary_on(store, today).await {
            Ok(false) => findings.push(format!("No daily summary found for {today}")),
            Ok(true) => {}
            Err(e) => findings.push(format!("Summary health check failed: {e}")),
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use guildmind_core::types::{jump_url, Message};
    use std::collections::BTreeSet;

    fn msg(id: u64, indexed_at: chrono::DateTime<Utc>, reactions: u32) -> Message {
        Message {
            message_id: id,
            channel_id: 10,
            author_id: 1,
            content: "x".into(),
            created_at: indexed_at,
            edited_at: None,
            attachments: vec![],
            embeds: vec![],
            reaction_count: reactions,
            reactors: BTreeSet::new(),
            reference_id: None,
            thread_id: None,
            is_pinned: false,
            is_deleted: false,
            jump_url: jump_url(1, 10, id),
            indexed_at,
        }
    }

    #[tokio::test]
    async fn silent_store_raises_both_ingestion_and_summary_alerts() {
        let store = Arc::new(Store::in_memory().await.unwrap());
        let today = Utc::now().date_naive();
        let findings = run_health_checks(&store, today).await;
        assert!(findings
            .iter()
            .any(|f| f == "No messages indexed in the last 6 hours"));
        // After 08:00 UTC the missing-summary alert joins the batch.
        if Utc::now().hour() >= SUMMARY_CHECK_HOUR {
            assert!(findings
                .iter()
                .any(|f| f.starts_with("No daily summary found for")));
        }
    }

    #[tokio::test]
    async fn healthy_store_raises_nothing_before_summary_window() {
        let store = Arc::new(Store::in_memory().await.unwrap());
        let now = Utc::now();
        records::upsert_messages(&store, &[msg(1, now, 2)]).await.unwrap();
        records::upsert_daily_summary(
            &store,
            &guildmind_core::types::DailySummary {
                date: now.date_naive(),
                channel_id: 10,
                full_summary: Some("[]".into()),
                short_summary: None,
                thread_id: None,
                status: guildmind_core::types::SummaryStatus::Completed,
                error: None,
            },
        )
        .await
        .unwrap();

        let findings = run_health_checks(&store, now.date_naive()).await;
        assert!(findings.is_empty(), "unexpected findings: {findings:?}");
    }

    #[tokio::test]
    async fn reaction_silence_with_ingestion_alerts() {
        let store = Arc::new(Store::in_memory().await.unwrap());
        let now = Utc::now();
        records::upsert_messages(&store, &[msg(1, now, 0)]).await.unwrap();
        // Use a date far in the past so the summary check can't interfere.
        let findings =
            run_health_checks(&store, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap().date_naive())
                .await;
        assert!(findings
            .iter()
            .any(|f| f == "No reactions recorded in the last 24 hours"));
    }
}
