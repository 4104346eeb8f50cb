//! Session orchestration: wires the pipeline graph and enforces the session
//! contract (state machine, counters, cancellation, terminal events).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use soundscout_common::error::{ErrorKind, Result, SoundscoutError};
use soundscout_common::events::{ProgressEvent, SessionSummary};
use soundscout_common::types::{
    ArtistProfile, CandidateVideo, Platform, SessionCounters, SessionRequest, SessionSnapshot,
    SessionState,
};

use crate::cancel::CancelToken;
use crate::dedup::{DedupOutcome, Deduplicator};
use crate::enrich::{EnrichmentCoordinator, SourceTimeouts};
use crate::fetch::StrategyFetcher;
use crate::filter::{evaluate_title, TitleVerdict};
use crate::harvest::{Harvester, HarvestSettings};
use crate::links::{extract_social_links, handle_from_url};
use crate::ports::{Analyzer, Fetcher, SpotifyApi, Store};
use crate::progress::{ProgressBus, ProgressReceiver};
use crate::quota::{BudgetGate, QuotaLimiter};
use crate::score;
use crate::search_url::UrlComposer;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Process-wide cap on concurrently running sessions.
    pub max_concurrent_sessions: usize,
    /// Enrichment worker pool size per session.
    pub enrichment_workers: usize,
    /// Depth of the candidate and work queues between stages.
    pub queue_depth: usize,
    pub harvest: HarvestSettings,
    pub source_timeouts: SourceTimeouts,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 4,
            enrichment_workers: 8,
            queue_depth: 16,
            harvest: HarvestSettings::default(),
            source_timeouts: SourceTimeouts::default(),
        }
    }
}

/// External collaborators handed to the orchestrator at construction.
pub struct PipelineDeps {
    pub fetcher: Arc<dyn Fetcher>,
    pub store: Arc<dyn Store>,
    pub analyzer: Option<Arc<dyn Analyzer>>,
    pub spotify: Option<Arc<dyn SpotifyApi>>,
    pub composer: Arc<dyn UrlComposer>,
    pub quota: Arc<QuotaLimiter>,
    pub cache: Arc<crate::cache::ResponseCache>,
}

#[derive(Default)]
struct Counters {
    videos_seen: AtomicU64,
    videos_accepted: AtomicU64,
    artists_enriched: AtomicU64,
    artists_stored: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SessionCounters {
        SessionCounters {
            videos_seen: self.videos_seen.load(Ordering::Relaxed),
            videos_accepted: self.videos_accepted.load(Ordering::Relaxed),
            artists_enriched: self.artists_enriched.load(Ordering::Relaxed),
            artists_stored: self.artists_stored.load(Ordering::Relaxed),
        }
    }
}

struct SessionHandle {
    id: Uuid,
    state: Mutex<SessionState>,
    counters: Arc<Counters>,
    cancel: CancelToken,
    bus: Arc<ProgressBus>,
    budget: Arc<BudgetGate>,
    started_at: DateTime<Utc>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<ErrorKind>>,
}

impl SessionHandle {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            state: *self.state.lock().expect("state mutex poisoned"),
            counters: self.counters.snapshot(),
            started_at: self.started_at,
            finished_at: *self.finished_at.lock().expect("finished mutex poisoned"),
            last_error: *self.last_error.lock().expect("error mutex poisoned"),
            budget_exhausted: self.budget.exhausted(),
        }
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if !state.is_terminal() {
            *state = next;
        }
    }
}

struct EnrichJob {
    video_id: String,
    profile: ArtistProfile,
}

/// Drives discovery sessions through their phases; the exclusive owner of
/// each session's state and progress bus.
pub struct Orchestrator {
    deps: Arc<PipelineDeps>,
    settings: SessionSettings,
    coordinator: Arc<EnrichmentCoordinator>,
    sessions: Mutex<HashMap<Uuid, Arc<SessionHandle>>>,
}

impl Orchestrator {
    pub fn new(deps: PipelineDeps, settings: SessionSettings) -> Self {
        // The strategy fetcher is process-wide: its headless/plain semaphores
        // bound browser memory across every concurrent session.
        let strategy = Arc::new(StrategyFetcher::new(
            Arc::clone(&deps.fetcher),
            Arc::clone(&deps.cache),
        ));
        let coordinator = Arc::new(EnrichmentCoordinator::new(
            strategy,
            deps.spotify.clone(),
            deps.analyzer.clone(),
            settings.source_timeouts,
        ));
        Self {
            deps: Arc::new(deps),
            settings,
            coordinator,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Validate the request, allocate a session, and start the pipeline in
    /// the background. Returns immediately with the session id.
    pub fn start(self: &Arc<Self>, request: SessionRequest) -> Result<Uuid> {
        request.validate()?;

        let handle = {
            let mut sessions = self.sessions.lock().expect("sessions mutex poisoned");
            let running = sessions
                .values()
                .filter(|h| !h.state.lock().expect("state mutex").is_terminal())
                .count();
            if running >= self.settings.max_concurrent_sessions {
                return Err(SoundscoutError::Busy);
            }

            let handle = Arc::new(SessionHandle {
                id: Uuid::new_v4(),
                state: Mutex::new(SessionState::Pending),
                counters: Arc::new(Counters::default()),
                cancel: CancelToken::new(),
                bus: Arc::new(ProgressBus::new()),
                budget: Arc::new(BudgetGate::new(
                    Arc::clone(&self.deps.quota),
                    request.max_cost_units,
                )),
                started_at: Utc::now(),
                finished_at: Mutex::new(None),
                last_error: Mutex::new(None),
            });
            sessions.insert(handle.id, Arc::clone(&handle));
            handle
        };

        let id = handle.id;
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.run_session(handle, request).await;
        });
        Ok(id)
    }

    /// Signal cancellation. Idempotent; unknown ids are `NotFound`.
    pub fn cancel(&self, session_id: Uuid) -> Result<()> {
        let sessions = self.sessions.lock().expect("sessions mutex poisoned");
        match sessions.get(&session_id) {
            Some(handle) => {
                handle.cancel.cancel();
                Ok(())
            }
            None => Err(SoundscoutError::NotFound(session_id.to_string())),
        }
    }

    /// Point-in-time copy of counters and state.
    pub fn status(&self, session_id: Uuid) -> Result<SessionSnapshot> {
        let sessions = self.sessions.lock().expect("sessions mutex poisoned");
        sessions
            .get(&session_id)
            .map(|h| h.snapshot())
            .ok_or_else(|| SoundscoutError::NotFound(session_id.to_string()))
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self, session_id: Uuid) -> Result<ProgressReceiver> {
        let sessions = self.sessions.lock().expect("sessions mutex poisoned");
        sessions
            .get(&session_id)
            .map(|h| h.bus.subscribe())
            .ok_or_else(|| SoundscoutError::NotFound(session_id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Driver
    // -----------------------------------------------------------------------

    async fn run_session(&self, handle: Arc<SessionHandle>, request: SessionRequest) {
        handle.set_state(SessionState::Running);
        info!(session = %handle.id, query = %request.query, target = request.target_count, "Session started");
        handle.bus.publish(ProgressEvent::SessionStarted {
            session_id: handle.id,
            query: request.query.clone(),
            target_count: request.target_count,
        });

        let fatal: Arc<Mutex<Option<SoundscoutError>>> = Arc::new(Mutex::new(None));
        let target = request.target_count as u64;

        let (candidate_tx, candidate_rx) = mpsc::channel::<CandidateVideo>(self.settings.queue_depth);
        let (work_tx, work_rx) = mpsc::channel::<EnrichJob>(self.settings.queue_depth);

        // Stage 1: harvester on its own task.
        let harvester = Harvester::new(
            Arc::clone(&self.deps.fetcher),
            Arc::clone(&self.deps.composer),
            self.settings.harvest.clone(),
        );
        let harvest_budget = Arc::clone(&handle.budget);
        let harvest_cancel = handle.cancel.clone();
        let query = request.query.clone();
        let filters = request.filters;
        let harvest_task = tokio::spawn(async move {
            harvester
                .run(
                    &query,
                    &filters,
                    target as usize,
                    &harvest_budget,
                    &harvest_cancel,
                    candidate_tx,
                )
                .await
        });

        // Stage 3: enrichment worker pool.
        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));
        let mut workers = JoinSet::new();
        for _ in 0..self.settings.enrichment_workers.max(1) {
            let work_rx = Arc::clone(&work_rx);
            let handle = Arc::clone(&handle);
            let coordinator = Arc::clone(&self.coordinator);
            let store = Arc::clone(&self.deps.store);
            let fatal = Arc::clone(&fatal);
            workers.spawn(async move {
                loop {
                    let job = {
                        let mut rx = work_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else { break };
                    enrich_and_store(&handle, &coordinator, store.as_ref(), &fatal, target, job)
                        .await;
                }
            });
        }

        // Stage 2: filter + extract + dedup, inline on this task.
        let dedup = Deduplicator::new(Arc::clone(&self.deps.store));
        self.filter_stage(&handle, &dedup, candidate_rx, work_tx, &fatal, target)
            .await;

        // Wind down: harvester first (its sender is gone once the filter
        // stage returns), then the workers drain the queue.
        match harvest_task.await {
            Ok(Ok(stats)) => {
                info!(session = %handle.id, emitted = stats.emitted, scrolls = stats.scroll_steps, "Harvest finished")
            }
            Ok(Err(e)) => warn!(session = %handle.id, error = %e, "Harvest errored"),
            Err(e) => error!(session = %handle.id, error = %e, "Harvest task panicked"),
        }
        while workers.join_next().await.is_some() {}

        self.finish_session(&handle, fatal).await;
    }

    async fn filter_stage(
        &self,
        handle: &Arc<SessionHandle>,
        dedup: &Deduplicator,
        mut candidate_rx: mpsc::Receiver<CandidateVideo>,
        work_tx: mpsc::Sender<EnrichJob>,
        fatal: &Arc<Mutex<Option<SoundscoutError>>>,
        target: u64,
    ) {
        loop {
            if fatal.lock().expect("fatal mutex").is_some() {
                break;
            }
            if handle.counters.artists_stored.load(Ordering::Relaxed) >= target {
                break;
            }
            let candidate = tokio::select! {
                _ = handle.cancel.cancelled() => break,
                c = candidate_rx.recv() => match c {
                    Some(c) => c,
                    None => break,
                },
            };

            handle.counters.videos_seen.fetch_add(1, Ordering::Relaxed);
            handle.bus.publish(ProgressEvent::CandidateFound {
                video_id: candidate.video_id.clone(),
                title: candidate.title.clone(),
            });

            let artist = match evaluate_title(
                &candidate.title,
                candidate.description_snippet.as_deref(),
            ) {
                TitleVerdict::Accepted { artist } => artist,
                TitleVerdict::Rejected { reason } => {
                    handle.bus.publish(ProgressEvent::ArtistRejected {
                        video_id: candidate.video_id.clone(),
                        reason: reason.to_string(),
                    });
                    continue;
                }
            };

            let profile = build_profile(artist, &candidate);

            match dedup.check_and_register(&profile).await {
                Ok(DedupOutcome::Fresh) => {
                    handle.counters.videos_accepted.fetch_add(1, Ordering::Relaxed);
                    handle.bus.publish(ProgressEvent::ArtistAccepted {
                        video_id: candidate.video_id.clone(),
                        name: profile.name.clone(),
                    });
                    let job = EnrichJob {
                        video_id: candidate.video_id.clone(),
                        profile,
                    };
                    if work_tx.send(job).await.is_err() {
                        break;
                    }
                }
                Ok(DedupOutcome::DuplicateOf(_)) => {
                    handle.bus.publish(ProgressEvent::ArtistRejected {
                        video_id: candidate.video_id.clone(),
                        reason: "duplicate artist".to_string(),
                    });
                }
                Err(e) => {
                    error!(session = %handle.id, error = %e, "Store unreachable during dedup");
                    *fatal.lock().expect("fatal mutex") =
                        Some(SoundscoutError::Fatal(format!("store unreachable: {e}")));
                    break;
                }
            }
        }
        // Dropping candidate_rx stops the harvester; dropping work_tx lets
        // the workers drain and exit.
    }

    async fn finish_session(
        &self,
        handle: &Arc<SessionHandle>,
        fatal: Arc<Mutex<Option<SoundscoutError>>>,
    ) {
        let counters = handle.counters.snapshot();
        let fatal = fatal.lock().expect("fatal mutex").take();

        let (state, event) = if handle.cancel.is_cancelled() {
            (
                SessionState::Cancelled,
                ProgressEvent::SessionFailed {
                    kind: ErrorKind::Cancelled,
                    message: "session cancelled".to_string(),
                    counters,
                },
            )
        } else if let Some(err) = fatal {
            (
                SessionState::Failed,
                ProgressEvent::SessionFailed {
                    kind: err.kind(),
                    message: err.to_string(),
                    counters,
                },
            )
        } else {
            // Zero artists with no fatal error is still a completed session.
            let elapsed_ms = (Utc::now() - handle.started_at).num_milliseconds().max(0) as u64;
            (
                SessionState::Completed,
                ProgressEvent::SessionCompleted {
                    summary: SessionSummary {
                        counters,
                        budget_exhausted: handle.budget.exhausted(),
                        elapsed_ms,
                    },
                },
            )
        };

        if let ProgressEvent::SessionFailed { kind, .. } = &event {
            *handle.last_error.lock().expect("error mutex") = Some(*kind);
        }
        handle.set_state(state);
        *handle.finished_at.lock().expect("finished mutex") = Some(Utc::now());

        // Persistence is best-effort at this point: the session outcome is
        // already decided and must reach subscribers either way.
        if let Err(e) = self.record_terminal(&handle, &event).await {
            warn!(session = %handle.id, error = %e, "Failed to persist session outcome");
        }

        info!(session = %handle.id, state = %state, ?counters, "Session finished");
        handle.bus.publish_terminal(event);
    }

    /// Journal the terminal event and record the final snapshot.
    async fn record_terminal(
        &self,
        handle: &SessionHandle,
        event: &ProgressEvent,
    ) -> anyhow::Result<()> {
        self.deps
            .store
            .append_session_event(handle.id, event)
            .await
            .context("journal terminal event")?;
        self.deps
            .store
            .record_session(&handle.snapshot())
            .await
            .context("record session snapshot")?;
        Ok(())
    }
}

async fn enrich_and_store(
    handle: &Arc<SessionHandle>,
    coordinator: &EnrichmentCoordinator,
    store: &dyn Store,
    fatal: &Arc<Mutex<Option<SoundscoutError>>>,
    target: u64,
    job: EnrichJob,
) {
    if handle.cancel.is_cancelled() || fatal.lock().expect("fatal mutex").is_some() {
        // The terminal SessionFailed event accounts for this candidate.
        return;
    }
    if handle.counters.artists_stored.load(Ordering::Relaxed) >= target {
        handle.bus.publish(ProgressEvent::ArtistRejected {
            video_id: job.video_id,
            reason: "session target reached".to_string(),
        });
        return;
    }

    let mut enriched = coordinator
        .enrich(&job.profile, &handle.budget, &handle.cancel)
        .await;

    if handle.cancel.is_cancelled() {
        // Partial results are discarded, never stored.
        return;
    }

    enriched.enrichment_score = score::score(&enriched);
    handle.counters.artists_enriched.fetch_add(1, Ordering::Relaxed);
    handle.bus.publish(ProgressEvent::ArtistEnriched {
        name: enriched.name.clone(),
        score: enriched.enrichment_score,
    });

    if handle.counters.artists_stored.load(Ordering::Relaxed) >= target {
        handle.bus.publish(ProgressEvent::ArtistRejected {
            video_id: job.video_id,
            reason: "session target reached".to_string(),
        });
        return;
    }

    match store.upsert_artist(&enriched).await {
        Ok(record) => {
            let stored = handle.counters.artists_stored.fetch_add(1, Ordering::Relaxed) + 1;
            let event = ProgressEvent::ArtistStored {
                name: enriched.name.clone(),
                artist_id: record.id,
            };
            if let Err(e) = store.append_session_event(handle.id, &event).await {
                warn!(session = %handle.id, error = %e, "Failed to journal stored artist");
            }
            handle.bus.publish(event);
            handle.bus.publish(ProgressEvent::PhaseProgress {
                phase: "store".to_string(),
                done: stored,
                target,
            });
        }
        Err(e) => {
            error!(session = %handle.id, error = %e, "Store write failed");
            *fatal.lock().expect("fatal mutex") =
                Some(SoundscoutError::Fatal(format!("store write failed: {e}")));
        }
    }
}

/// Initial profile from an accepted candidate: the canonical artist name plus
/// whatever identity the search result itself carries.
fn build_profile(artist: String, candidate: &CandidateVideo) -> ArtistProfile {
    let mut profile = ArtistProfile::named(artist);
    profile.youtube_channel_id = candidate.channel_id.clone();
    profile.youtube_channel_url = candidate.channel_url.clone();
    profile.discovery_video_id = Some(candidate.video_id.clone());
    profile.discovery_video_title = Some(candidate.title.clone());

    if let Some(description) = &candidate.description_snippet {
        let links = extract_social_links(description);
        profile.instagram_handle = links
            .get(Platform::Instagram)
            .and_then(|u| handle_from_url(Platform::Instagram, u));
        profile.tiktok_handle = links
            .get(Platform::TikTok)
            .and_then(|u| handle_from_url(Platform::TikTok, u));
        profile.spotify_id = links
            .get(Platform::Spotify)
            .and_then(|u| handle_from_url(Platform::Spotify, u));
        profile.website = links.get(Platform::Website).map(str::to_string);
        profile.social_links = links;
    }
    profile
}
