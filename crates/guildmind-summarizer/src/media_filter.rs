use std::sync::Arc;

use tracing::info;

use guildmind_llm::moderation::ModerationClient;

use crate::parse::{split_file_urls, NewsItem};

const IMAGE_EXTS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp"];

fn looks_like_image(url: &str) -> bool {
    let lower = url.to_lowercase();
    let path = lower.split('?').next().unwrap_or(&lower);
    IMAGE_EXTS.iter().any(|ext| path.ends_with(ext))
}

/// Strip moderation-blocked image references from summary items before the
/// payload is posted or stored. Video URLs pass through untouched — the
/// image moderator cannot judge them. Returns the number of removed URLs.
pub async fn filter_items(moderation: &Arc<ModerationClient>, items: &mut [NewsItem]) -> usize {
    if !moderation.is_enabled() {
        return 0;
    }

    let mut removed = 0usize;
    for item in items.iter_mut() {
        if let Some(ref files) = item.main_file {
            let (kept, dropped) = filter_urls(moderation, files).await;
            removed += dropped;
            item.main_file = if kept.is_empty() { None } else { Some(kept.join(", ")) };
        }
        for sub in &mut item.sub_topics {
            if let Some(ref files) = sub.file {
                let (kept, dropped) = filter_urls(moderation, files).await;
                removed += dropped;
                sub.file = if kept.is_empty() { None } else { Some(kept.join(", ")) };
            }
        }
    }

    if removed > 0 {
        info!(removed, "blocked media references stripped from summary");
    }
    removed
}

async fn filter_urls(moderation: &Arc<ModerationClient>, files: &str) -> (Vec<String>, usize) {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    for url in split_file_urls(files) {
        if looks_like_image(&url) && moderation.check_image(&url).await.block {
            dropped += 1;
        } else {
            kept.push(url);
        }
    }
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extension_detection_ignores_query_strings() {
        assert!(looks_like_image("https://cdn/x.PNG?ex=abc"));
        assert!(looks_like_image("https://cdn/y.jpeg"));
        assert!(!looks_like_image("https://cdn/z.mp4"));
        assert!(!looks_like_image("https://cdn/plain"));
    }
}
