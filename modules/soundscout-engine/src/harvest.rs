//! Scroll-until-target harvesting of candidate videos from a search surface.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use soundscout_common::types::{CandidateVideo, SearchFilters};

use crate::cancel::CancelToken;
use crate::numbers::parse_count;
use crate::ports::{Fetcher, RenderOptions};
use crate::quota::BudgetGate;
use crate::search_url::UrlComposer;

fn video_id_res() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"watch\?v=([A-Za-z0-9_-]{11})").expect("watch regex"),
            Regex::new(r"youtu\.be/([A-Za-z0-9_-]{11})").expect("short-link regex"),
            Regex::new(r"/shorts/([A-Za-z0-9_-]{11})").expect("shorts regex"),
        ]
    })
}

/// Extract an 11-char video id from any of the recognized URL shapes.
pub fn video_id_from_url(url: &str) -> Option<String> {
    video_id_res()
        .iter()
        .find_map(|re| re.captures(url))
        .map(|c| c[1].to_string())
}

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    /// Consecutive scroll steps with no new candidates before stopping.
    pub no_progress_limit: u32,
    /// Absolute cap on candidates emitted by one harvester.
    pub hard_ceiling: usize,
    /// Settle delay between scroll and re-parse.
    pub settle_ms: u64,
    /// Scroll until `target × overfetch_factor` candidates have been emitted,
    /// absorbing downstream filter loss.
    pub overfetch_factor: u32,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            no_progress_limit: 3,
            hard_ceiling: 1000,
            settle_ms: 500,
            overfetch_factor: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub emitted: usize,
    pub scroll_steps: u32,
    pub budget_stopped: bool,
}

/// Converts one search surface into a finite sequence of candidate videos.
/// Single-shot: restart by constructing a new harvester run.
pub struct Harvester {
    fetcher: Arc<dyn Fetcher>,
    composer: Arc<dyn UrlComposer>,
    settings: HarvestSettings,
}

impl Harvester {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        composer: Arc<dyn UrlComposer>,
        settings: HarvestSettings,
    ) -> Self {
        Self {
            fetcher,
            composer,
            settings,
        }
    }

    /// Harvest candidates into `tx` until the scroll target, the hard
    /// ceiling, the no-progress window, budget denial, cancellation, or a
    /// closed receiver. Scroll failures are no-progress; two in a row end the
    /// harvest with whatever was already emitted.
    pub async fn run(
        &self,
        query: &str,
        filters: &SearchFilters,
        target: usize,
        budget: &BudgetGate,
        cancel: &CancelToken,
        tx: mpsc::Sender<CandidateVideo>,
    ) -> Result<HarvestStats> {
        let mut stats = HarvestStats::default();
        let scroll_target = target
            .saturating_mul(self.settings.overfetch_factor as usize)
            .min(self.settings.hard_ceiling);

        if !budget.try_acquire("youtube.search", 1) {
            info!("No budget for search, harvest skipped");
            stats.budget_stopped = true;
            return Ok(stats);
        }

        let url = self.composer.compose(query, filters);
        info!(url, target = scroll_target, "Opening search surface");

        let mut session = match self.fetcher.open_session(&RenderOptions::default()).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to open harvest session");
                return Ok(stats);
            }
        };

        let mut html = tokio::select! {
            _ = cancel.cancelled() => return Ok(stats),
            r = session.navigate(&url) => match r {
                Ok(h) => h,
                Err(e) => {
                    warn!(error = %e, url, "Search navigation failed");
                    return Ok(stats);
                }
            },
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut no_progress = 0u32;
        let mut consecutive_errors = 0u32;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let mut new_this_step = 0usize;
            for candidate in parse_candidates(&html) {
                if !seen.insert(candidate.video_id.clone()) {
                    continue;
                }
                new_this_step += 1;
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(stats),
                    sent = tx.send(candidate) => {
                        if sent.is_err() {
                            debug!("Harvest consumer closed, stopping");
                            return Ok(stats);
                        }
                    }
                }
                stats.emitted += 1;
                if stats.emitted >= self.settings.hard_ceiling {
                    info!(emitted = stats.emitted, "Harvest hard ceiling reached");
                    return Ok(stats);
                }
            }

            if new_this_step > 0 {
                no_progress = 0;
            } else {
                no_progress += 1;
            }

            if stats.emitted >= scroll_target {
                debug!(emitted = stats.emitted, "Harvest scroll target reached");
                break;
            }
            if no_progress >= self.settings.no_progress_limit {
                info!(emitted = stats.emitted, "No new candidates, harvest exhausted");
                break;
            }

            if !budget.try_acquire("youtube.videos", 1) {
                info!("Budget exhausted mid-harvest");
                stats.budget_stopped = true;
                break;
            }

            stats.scroll_steps += 1;
            let scrolled = tokio::select! {
                _ = cancel.cancelled() => break,
                r = session.scroll(self.settings.settle_ms) => r,
            };
            match scrolled {
                Ok(next) => {
                    consecutive_errors = 0;
                    html = next;
                }
                Err(e) => {
                    warn!(error = %e, "Scroll step failed");
                    consecutive_errors += 1;
                    no_progress += 1;
                    if consecutive_errors >= 2 {
                        info!(emitted = stats.emitted, "Two scroll errors, harvest stopped");
                        break;
                    }
                }
            }
        }

        Ok(stats)
    }
}

/// Parse currently visible candidates in DOM order.
///
/// Renderer containers carry the richest metadata; a generic anchor scan
/// picks up anything the container pass missed (mobile layouts, bare links).
pub fn parse_candidates(html: &str) -> Vec<CandidateVideo> {
    let document = Html::parse_document(html);
    let mut out: Vec<CandidateVideo> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let container_sel = Selector::parse(
        "ytd-video-renderer, ytd-compact-video-renderer, div.video-renderer",
    )
    .expect("container selector");
    for container in document.select(&container_sel) {
        if let Some(candidate) = candidate_from_container(&container) {
            if seen.insert(candidate.video_id.clone()) {
                out.push(candidate);
            }
        }
    }

    let anchor_sel = Selector::parse("a[href]").expect("anchor selector");
    for anchor in document.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(video_id) = video_id_from_url(href) else {
            continue;
        };
        if !seen.insert(video_id.clone()) {
            continue;
        }
        let title = anchor_title(&anchor);
        if title.is_empty() {
            seen.remove(&video_id);
            continue;
        }
        out.push(CandidateVideo {
            url: watch_url(&video_id),
            video_id,
            title,
            channel_id: None,
            channel_url: None,
            description_snippet: None,
            view_count: None,
            upload_hint: None,
        });
    }

    out
}

fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

fn candidate_from_container(container: &ElementRef) -> Option<CandidateVideo> {
    let anchor_sel = Selector::parse("a[href]").expect("anchor selector");

    let mut video_id: Option<String> = None;
    let mut title = String::new();
    let mut channel_url: Option<String> = None;

    for anchor in container.select(&anchor_sel) {
        let href = anchor.value().attr("href")?;
        if video_id.is_none() {
            if let Some(id) = video_id_from_url(href) {
                video_id = Some(id);
                title = anchor_title(&anchor);
                continue;
            }
        }
        if channel_url.is_none() && (href.contains("/channel/") || href.contains("/@")) {
            channel_url = Some(absolutize(href));
        }
    }

    let video_id = video_id?;
    if title.is_empty() {
        return None;
    }

    let channel_id = channel_url
        .as_deref()
        .and_then(|u| u.split("/channel/").nth(1))
        .map(|rest| rest.split(['/', '?']).next().unwrap_or(rest).to_string());

    let description_snippet = select_text(container, "#description-text, .description, yt-formatted-string.metadata-snippet-text");

    let all_text: String = container.text().collect::<Vec<_>>().join(" ");
    let view_count = all_text
        .split_whitespace()
        .zip(all_text.split_whitespace().skip(1))
        .find(|(_, next)| next.trim_start_matches(|c: char| !c.is_alphabetic()).starts_with("view"))
        .and_then(|(count, _)| parse_count(count));
    let upload_hint = all_text
        .split(['·', '•'])
        .map(str::trim)
        .find(|part| part.ends_with("ago"))
        .map(str::to_string);

    Some(CandidateVideo {
        url: watch_url(&video_id),
        video_id,
        title,
        channel_id,
        channel_url,
        description_snippet,
        view_count,
        upload_hint,
    })
}

fn anchor_title(anchor: &ElementRef) -> String {
    if let Some(t) = anchor.value().attr("title") {
        let t = t.trim();
        if !t.is_empty() {
            return t.to_string();
        }
    }
    anchor.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn select_text(container: &ElementRef, selectors: &str) -> Option<String> {
    let sel = Selector::parse(selectors).ok()?;
    container
        .select(&sel)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" ").trim().to_string())
        .filter(|s| !s.is_empty())
}

fn absolutize(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("https://www.youtube.com{href}")
    }
}
