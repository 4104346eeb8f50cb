//! End-to-end pipeline scenarios against the fake ports: happy path,
//! dedup, source isolation, budget stop, and cancellation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use soundscout_common::error::{ErrorKind, SoundscoutError};
use soundscout_common::events::ProgressEvent;
use soundscout_common::types::{SessionRequest, SessionState};
use soundscout_engine::cache::ResponseCache;
use soundscout_engine::fixtures::{
    search_page, spotify_artist, FakeAnalyzer, FakeFetcher, FakeSpotify, FakeVideo,
};
use soundscout_engine::search_url::SpTokenComposer;
use soundscout_engine::{
    MemoryStore, Orchestrator, PipelineDeps, QuotaLimiter, SessionSettings, SpotifyApi,
};
use uuid::Uuid;

const FAKE_IO_DELAY: Duration = Duration::from_millis(10);

struct Rig {
    orchestrator: Arc<Orchestrator>,
    store: Arc<MemoryStore>,
    fetcher: FakeFetcher,
}

fn rig(spotify: Option<Arc<dyn SpotifyApi>>) -> Rig {
    rig_with(spotify, SessionSettings::default(), 0)
}

fn rig_with(
    spotify: Option<Arc<dyn SpotifyApi>>,
    mut settings: SessionSettings,
    daily_budget: u64,
) -> Rig {
    // One worker keeps enrichment in arrival order, which the scenario
    // assertions rely on.
    settings.enrichment_workers = 1;
    let store = Arc::new(MemoryStore::new());
    let fetcher = FakeFetcher::new();
    fetcher.set_delay(FAKE_IO_DELAY);
    let deps = PipelineDeps {
        fetcher: Arc::new(fetcher.clone()),
        store: Arc::clone(&store) as Arc<dyn soundscout_engine::Store>,
        analyzer: Some(Arc::new(FakeAnalyzer)),
        spotify,
        composer: Arc::new(SpTokenComposer::new("www.youtube.com")),
        quota: Arc::new(QuotaLimiter::new(daily_budget)),
        cache: Arc::new(ResponseCache::new()),
    };
    Rig {
        orchestrator: Arc::new(Orchestrator::new(deps, settings)),
        store,
        fetcher,
    }
}

async fn run_session(rig: &Rig, request: SessionRequest) -> Result<(Uuid, Vec<ProgressEvent>)> {
    let id = rig.orchestrator.start(request)?;
    let rx = rig.orchestrator.subscribe(id)?;
    let events = tokio::time::timeout(Duration::from_secs(30), rx.collect())
        .await
        .context("session should finish")?;
    Ok((id, events))
}

fn stored_names(events: &[ProgressEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::ArtistStored { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

fn s1_search_page() -> String {
    search_page(&[
        FakeVideo::new("videoalice1", "Alice - Song (Official Music Video)")
            .with_description("https://instagram.com/alicemusic"),
        FakeVideo::new("videobob222", "Bob feat. Carol - Hit (Official Music Video)")
            .with_description("https://instagram.com/bobsounds"),
        FakeVideo::new("videotutor3", "Tutorial"),
        FakeVideo::new("videoalice4", "Alice - Song (Official Music Video)")
            .with_description("https://instagram.com/alicemusic"),
        FakeVideo::new("videodave55", "Dave | Track Official Video")
            .with_description("https://instagram.com/davetracks"),
    ])
}

/// Canned profile pages for the S1 artists, so enrichment resolves on the
/// first fetch strategy.
fn serve_s1_profiles(rig: &Rig) {
    for (handle, followers) in [
        ("alicemusic", "4,200"),
        ("bobsounds", "1,900"),
        ("davetracks", "800"),
    ] {
        rig.fetcher.serve(
            &format!("https://www.instagram.com/{handle}/"),
            &format!(r#"<meta content="{followers} Followers" property="og:description">"#),
        );
    }
}

// --- S1: happy path ---

#[tokio::test]
async fn happy_path_stores_two_unique_artists() -> Result<()> {
    let rig = rig(None);
    rig.fetcher.search_pages(vec![s1_search_page()]);
    serve_s1_profiles(&rig);

    let mut request = SessionRequest::new("official music video").with_target(2);
    request.filters.set("upload_date", "week")?;
    let (id, events) = run_session(&rig, request).await?;

    assert_eq!(stored_names(&events), vec!["Alice", "Bob"]);
    assert_eq!(rig.store.artist_count(), 2);

    let snapshot = rig.orchestrator.status(id)?;
    assert_eq!(snapshot.state, SessionState::Completed);
    assert_eq!(snapshot.counters.videos_seen, 5);
    assert_eq!(snapshot.counters.videos_accepted, 3);
    assert_eq!(snapshot.counters.artists_enriched, 2);
    assert_eq!(snapshot.counters.artists_stored, 2);

    // terminal event carries the same counters
    match events.last().context("at least the terminal event")? {
        ProgressEvent::SessionCompleted { summary } => {
            assert_eq!(summary.counters.artists_stored, 2);
            assert!(!summary.budget_exhausted);
        }
        other => panic!("expected SessionCompleted, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn happy_path_rejects_tutorial_and_duplicate() -> Result<()> {
    let rig = rig(None);
    rig.fetcher.search_pages(vec![s1_search_page()]);
    serve_s1_profiles(&rig);

    let (_, events) = run_session(
        &rig,
        SessionRequest::new("official music video").with_target(2),
    )
    .await?;

    let rejected: Vec<(&str, &str)> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::ArtistRejected { video_id, reason } => {
                Some((video_id.as_str(), reason.as_str()))
            }
            _ => None,
        })
        .collect();

    assert!(rejected
        .iter()
        .any(|(id, r)| *id == "videotutor3" && r.contains("marker")));
    assert!(rejected
        .iter()
        .any(|(id, r)| *id == "videoalice4" && r.contains("duplicate")));
    Ok(())
}

// --- Progress ordering (property 8) ---

#[tokio::test]
async fn per_artist_events_are_totally_ordered() -> Result<()> {
    let rig = rig(None);
    rig.fetcher.search_pages(vec![s1_search_page()]);
    serve_s1_profiles(&rig);

    let (_, events) = run_session(
        &rig,
        SessionRequest::new("official music video").with_target(2),
    )
    .await?;

    let index_of = |pred: &dyn Fn(&ProgressEvent) -> bool| -> Option<usize> {
        events.iter().position(|e| pred(e))
    };

    for (video_id, name) in [("videoalice1", "Alice"), ("videobob222", "Bob")] {
        let found = index_of(&|e| {
            matches!(e, ProgressEvent::CandidateFound { video_id: v, .. } if v == video_id)
        })
        .context("candidate seen")?;
        let accepted = index_of(&|e| {
            matches!(e, ProgressEvent::ArtistAccepted { video_id: v, .. } if v == video_id)
        })
        .context("accepted")?;
        let enriched = index_of(&|e| {
            matches!(e, ProgressEvent::ArtistEnriched { name: n, .. } if n == name)
        })
        .context("enriched")?;
        let stored = index_of(&|e| {
            matches!(e, ProgressEvent::ArtistStored { name: n, .. } if n == name)
        })
        .context("stored")?;
        assert!(found < accepted && accepted < enriched && enriched < stored);
    }
    Ok(())
}

// --- S2: featured-artist stripping feeds dedup ---

#[tokio::test]
async fn featured_artists_are_stripped_and_deduped() -> Result<()> {
    let rig = rig(None);
    rig.fetcher.search_pages(vec![search_page(&[
        FakeVideo::new("videodrake1", "Drake ft. Future - Life Is Good (Official Music Video)"),
        FakeVideo::new("videodrake2", "Drake - Other Song (Official Music Video)"),
    ])]);

    let (_, events) = run_session(&rig, SessionRequest::new("drake").with_target(5)).await?;

    assert_eq!(stored_names(&events), vec!["Drake"]);
    let records = rig.store.artists();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].profile.name, "Drake");
    assert_eq!(records[0].fingerprint, "name:drake");

    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::ArtistRejected { video_id, reason }
            if video_id == "videodrake2" && reason.contains("duplicate")
    )));
    Ok(())
}

// --- S3: redirect-wrapped social links survive to the stored profile ---

#[tokio::test]
async fn redirect_wrapped_links_are_decoded_into_the_profile() -> Result<()> {
    let rig = rig(None);
    rig.fetcher.search_pages(vec![search_page(&[FakeVideo::new(
        "videoxart01",
        "ArtistX - Single (Official Music Video)",
    )
    .with_description(
        "https://www.youtube.com/redirect?event=video_description&q=https%3A%2F%2Fwww.instagram.com%2Fartistx",
    )])]);
    rig.fetcher.serve(
        "https://www.instagram.com/artistx/",
        r#"<meta content="2,400 Followers" property="og:description">"#,
    );

    let (_, events) = run_session(&rig, SessionRequest::new("artistx").with_target(1)).await?;

    assert_eq!(stored_names(&events), vec!["ArtistX"]);
    let record = &rig.store.artists()[0];
    assert_eq!(
        record.profile.social_links.instagram.as_deref(),
        Some("https://www.instagram.com/artistx")
    );
    assert_eq!(record.profile.instagram_handle.as_deref(), Some("artistx"));
    Ok(())
}

// --- S4: source isolation ---

#[tokio::test]
async fn blocked_spotify_does_not_stop_instagram() -> Result<()> {
    let spotify = Arc::new(FakeSpotify::new());
    spotify.fail_with("blocked");
    let spotify_port: Arc<dyn SpotifyApi> = spotify;
    let rig = rig(Some(spotify_port));

    rig.fetcher.search_pages(vec![search_page(&[FakeVideo::new(
        "videoisol01",
        "Iso - Late (Official Music Video)",
    )
    .with_description("ig https://instagram.com/iso_late")])]);
    rig.fetcher.serve(
        "https://www.instagram.com/iso_late/",
        r#"<meta content="12,345 Followers" property="og:description">"#,
    );

    let (id, events) = run_session(&rig, SessionRequest::new("iso").with_target(1)).await?;

    assert_eq!(stored_names(&events), vec!["Iso"]);
    let profile = &rig.store.artists()[0].profile;
    assert_eq!(profile.follower_counts.instagram_followers, Some(12_345));
    assert!(profile.spotify_id.is_none());
    assert!(profile.follower_counts.spotify_followers.is_none());
    assert_eq!(rig.orchestrator.status(id)?.state, SessionState::Completed);
    Ok(())
}

#[tokio::test]
async fn spotify_enrichment_fills_profile_when_available() -> Result<()> {
    let spotify = Arc::new(FakeSpotify::new());
    spotify.add_artist(spotify_artist("sp_nova", "Nova", 4500));
    spotify.set_top_tracks("sp_nova", vec!["Comet".into()]);
    let spotify_port: Arc<dyn SpotifyApi> = spotify;
    let rig = rig(Some(spotify_port));

    rig.fetcher.search_pages(vec![search_page(&[FakeVideo::new(
        "videonova01",
        "Nova - Comet (Official Music Video)",
    )])]);
    rig.fetcher.serve(
        "https://open.spotify.com/artist/sp_nova",
        r#"<html><body>8,500 monthly listeners {"city":"Lisbon"}</body></html>"#,
    );
    rig.fetcher.serve(
        "https://www.musixmatch.com/lyrics/nova/comet",
        "<html><body><div class=\"lyrics\">Falling through the evening sky tonight \
         we trace the comet trails in silver light and every window in the sleeping \
         town reflects the burning pieces coming down</div></body></html>",
    );

    let (_, events) = run_session(&rig, SessionRequest::new("nova").with_target(1)).await?;

    assert_eq!(stored_names(&events), vec!["Nova"]);
    let profile = &rig.store.artists()[0].profile;
    assert_eq!(profile.spotify_id.as_deref(), Some("sp_nova"));
    assert_eq!(profile.follower_counts.spotify_followers, Some(4500));
    assert_eq!(profile.follower_counts.spotify_monthly_listeners, Some(8500));
    assert_eq!(profile.location.as_deref(), Some("Lisbon"));
    assert_eq!(profile.genres, vec!["indie"]);
    assert!(!profile.lyric_themes.is_empty(), "lyric themes should merge in");
    Ok(())
}

// --- S5: budget stop ---

#[tokio::test]
async fn session_budget_stops_the_harvest_and_flags_the_summary() -> Result<()> {
    let rig = rig(None);
    rig.fetcher.search_pages(vec![
        search_page(&[
            FakeVideo::new("videobud001", "Budgeted - One (Official Music Video)"),
            FakeVideo::new("videobud002", "Frugal - Two (Official Music Video)"),
        ]),
        // a second page exists but the budget denies the scroll to reach it
        search_page(&[FakeVideo::new(
            "videobud003",
            "Unreached - Three (Official Music Video)",
        )]),
    ]);

    let request = SessionRequest::new("official music video")
        .with_target(10)
        .with_max_cost(1);
    let (id, events) = run_session(&rig, request).await?;

    assert_eq!(stored_names(&events), vec!["Budgeted", "Frugal"]);
    let snapshot = rig.orchestrator.status(id)?;
    assert_eq!(snapshot.state, SessionState::Completed);
    assert!(snapshot.budget_exhausted);
    match events.last().context("at least the terminal event")? {
        ProgressEvent::SessionCompleted { summary } => assert!(summary.budget_exhausted),
        other => panic!("expected SessionCompleted, got {other:?}"),
    }
    Ok(())
}

// --- S6: cancellation ---

#[tokio::test]
async fn cancellation_is_observed_within_five_seconds() -> Result<()> {
    let rig = rig(None);
    rig.fetcher.set_delay(Duration::from_secs(10));
    rig.fetcher.search_pages(vec![s1_search_page()]);

    let id = rig
        .orchestrator
        .start(SessionRequest::new("official music video").with_target(2))?;
    let rx = rig.orchestrator.subscribe(id)?;

    let orchestrator = Arc::clone(&rig.orchestrator);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        orchestrator.cancel(id).expect("cancel known session");
        // second cancel is idempotent
        orchestrator.cancel(id).expect("repeat cancel");
    });

    let events = tokio::time::timeout(Duration::from_secs(5), rx.collect())
        .await
        .context("cancellation must surface within 5s")?;

    assert!(stored_names(&events).is_empty());
    match events.last().context("at least the terminal event")? {
        ProgressEvent::SessionFailed { kind, .. } => assert_eq!(*kind, ErrorKind::Cancelled),
        other => panic!("expected SessionFailed, got {other:?}"),
    }
    assert_eq!(rig.orchestrator.status(id)?.state, SessionState::Cancelled);
    assert_eq!(rig.store.artist_count(), 0);
    Ok(())
}

// --- request validation and session caps ---

#[tokio::test]
async fn invalid_requests_are_rejected_without_a_session() {
    let rig = rig(None);
    let err = rig
        .orchestrator
        .start(SessionRequest::new("   "))
        .unwrap_err();
    assert!(matches!(err, SoundscoutError::InvalidRequest(_)));

    let err = rig
        .orchestrator
        .start(SessionRequest::new("q").with_target(0))
        .unwrap_err();
    assert!(matches!(err, SoundscoutError::InvalidRequest(_)));
}

#[tokio::test]
async fn concurrent_session_cap_returns_busy() -> Result<()> {
    let mut settings = SessionSettings::default();
    settings.max_concurrent_sessions = 1;
    let rig = rig_with(None, settings, 0);
    rig.fetcher.set_delay(Duration::from_secs(5));
    rig.fetcher.search_pages(vec![s1_search_page()]);

    let first = rig
        .orchestrator
        .start(SessionRequest::new("official music video"))?;
    let err = rig
        .orchestrator
        .start(SessionRequest::new("official music video"))
        .unwrap_err();
    assert!(matches!(err, SoundscoutError::Busy));

    rig.orchestrator.cancel(first)?;
    Ok(())
}

#[tokio::test]
async fn unknown_session_ids_are_not_found() {
    let rig = rig(None);
    let missing = Uuid::new_v4();
    assert!(matches!(
        rig.orchestrator.cancel(missing),
        Err(SoundscoutError::NotFound(_))
    ));
    assert!(matches!(
        rig.orchestrator.status(missing),
        Err(SoundscoutError::NotFound(_))
    ));
    assert!(rig.orchestrator.subscribe(missing).is_err());
}

// --- empty harvest still completes ---

#[tokio::test]
async fn zero_artists_is_completed_not_failed() -> Result<()> {
    let rig = rig(None);
    rig.fetcher
        .search_pages(vec!["<html><body>no videos</body></html>".to_string()]);

    let (id, events) = run_session(&rig, SessionRequest::new("nothing here")).await?;

    assert!(stored_names(&events).is_empty());
    assert_eq!(rig.orchestrator.status(id)?.state, SessionState::Completed);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::SessionCompleted { .. })
    ));
    Ok(())
}

// --- session snapshot is recorded through the store port ---

#[tokio::test]
async fn terminal_snapshot_and_events_reach_the_store() -> Result<()> {
    let rig = rig(None);
    rig.fetcher.search_pages(vec![s1_search_page()]);
    serve_s1_profiles(&rig);

    let (id, _) = run_session(
        &rig,
        SessionRequest::new("official music video").with_target(2),
    )
    .await?;

    let recorded = rig.store.session(id).context("session snapshot recorded")?;
    assert_eq!(recorded.state, SessionState::Completed);
    assert_eq!(recorded.counters.artists_stored, 2);
    // two ArtistStored entries plus the terminal event
    assert_eq!(rig.store.journal_len(id), 3);
    Ok(())
}
