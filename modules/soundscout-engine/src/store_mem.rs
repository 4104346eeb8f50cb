//! In-memory store implementation.
//!
//! Backs the CLI's dry-run mode and the test suite. The relational driver is
//! an external collaborator behind the same [`Store`] port; this one keeps
//! the same insert-or-merge semantics in a process-local map.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use soundscout_common::error::Result;
use soundscout_common::events::ProgressEvent;
use soundscout_common::types::{normalize_name, ArtistProfile, SessionSnapshot};

use crate::merge::merge_profiles;
use crate::ports::{ArtistIdentifier, ArtistRecord, Store};

#[derive(Default)]
struct StoreState {
    /// fingerprint → record
    artists: HashMap<String, ArtistRecord>,
    sessions: HashMap<Uuid, SessionSnapshot>,
    journal: Vec<(Uuid, ProgressEvent)>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artist_count(&self) -> usize {
        self.state.lock().expect("store mutex poisoned").artists.len()
    }

    pub fn artists(&self) -> Vec<ArtistRecord> {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .artists
            .values()
            .cloned()
            .collect()
    }

    pub fn session(&self, id: Uuid) -> Option<SessionSnapshot> {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .sessions
            .get(&id)
            .cloned()
    }

    pub fn journal_len(&self, session_id: Uuid) -> usize {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .journal
            .iter()
            .filter(|(id, _)| *id == session_id)
            .count()
    }

    fn matches(record: &ArtistRecord, identifier: &ArtistIdentifier) -> bool {
        let p = &record.profile;
        match identifier {
            ArtistIdentifier::YoutubeChannelId(id) => p.youtube_channel_id.as_deref() == Some(id),
            ArtistIdentifier::SpotifyId(id) => p.spotify_id.as_deref() == Some(id),
            ArtistIdentifier::InstagramHandle(h) => p
                .instagram_handle
                .as_deref()
                .is_some_and(|have| have.eq_ignore_ascii_case(h)),
            ArtistIdentifier::TiktokHandle(h) => p
                .tiktok_handle
                .as_deref()
                .is_some_and(|have| have.eq_ignore_ascii_case(h)),
            ArtistIdentifier::NormalizedName(n) => &normalize_name(&p.name) == n,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_artist_by(&self, identifier: &ArtistIdentifier) -> Result<Option<ArtistRecord>> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .artists
            .values()
            .find(|r| Self::matches(r, identifier))
            .cloned())
    }

    async fn upsert_artist(&self, profile: &ArtistProfile) -> Result<ArtistRecord> {
        let fingerprint = profile.fingerprint();
        let now = Utc::now();
        let mut state = self.state.lock().expect("store mutex poisoned");
        let record = state
            .artists
            .entry(fingerprint.clone())
            .and_modify(|existing| {
                merge_profiles(&mut existing.profile, profile);
                existing.last_updated = now;
            })
            .or_insert_with(|| ArtistRecord {
                id: Uuid::new_v4(),
                fingerprint,
                profile: profile.clone(),
                first_seen: now,
                last_updated: now,
            });
        Ok(record.clone())
    }

    async fn record_session(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.sessions.insert(snapshot.session_id, snapshot.clone());
        Ok(())
    }

    async fn append_session_event(&self, session_id: Uuid, event: &ProgressEvent) -> Result<()> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.journal.push((session_id, event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundscout_common::types::FollowerCounts;

    #[tokio::test]
    async fn upsert_inserts_then_merges() {
        let store = MemoryStore::new();
        let mut p = ArtistProfile::named("Alice");
        p.instagram_handle = Some("alice".into());
        p.follower_counts.instagram_followers = Some(100);

        let first = store.upsert_artist(&p).await.unwrap();
        assert_eq!(store.artist_count(), 1);

        p.follower_counts.instagram_followers = Some(50); // lower, must not win
        p.bio = Some("new bio".into());
        let second = store.upsert_artist(&p).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.artist_count(), 1);
        assert_eq!(second.profile.follower_counts.instagram_followers, Some(100));
        assert_eq!(second.profile.bio.as_deref(), Some("new bio"));
    }

    #[tokio::test]
    async fn find_by_each_identifier_kind() {
        let store = MemoryStore::new();
        let mut p = ArtistProfile::named("Tyler, The Creator");
        p.youtube_channel_id = Some("UCtyler".into());
        p.spotify_id = Some("sp_t".into());
        p.instagram_handle = Some("TylerIG".into());
        p.tiktok_handle = Some("tylertt".into());
        store.upsert_artist(&p).await.unwrap();

        for identifier in [
            ArtistIdentifier::YoutubeChannelId("UCtyler".into()),
            ArtistIdentifier::SpotifyId("sp_t".into()),
            ArtistIdentifier::InstagramHandle("tylerig".into()),
            ArtistIdentifier::TiktokHandle("TYLERTT".into()),
            ArtistIdentifier::NormalizedName("tyler the creator".into()),
        ] {
            assert!(
                store.find_artist_by(&identifier).await.unwrap().is_some(),
                "missed by {identifier:?}"
            );
        }
        assert!(store
            .find_artist_by(&ArtistIdentifier::SpotifyId("other".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn record_session_is_idempotent_by_id() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let snapshot = SessionSnapshot {
            session_id: id,
            state: soundscout_common::types::SessionState::Completed,
            counters: Default::default(),
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            last_error: None,
            budget_exhausted: false,
        };
        store.record_session(&snapshot).await.unwrap();
        store.record_session(&snapshot).await.unwrap();
        assert!(store.session(id).is_some());
    }

    #[tokio::test]
    async fn merge_keeps_count_monotonic() {
        let store = MemoryStore::new();
        let mut p = ArtistProfile::named("X");
        p.follower_counts = FollowerCounts {
            spotify_followers: Some(10),
            ..Default::default()
        };
        store.upsert_artist(&p).await.unwrap();
        p.follower_counts.spotify_followers = Some(1000);
        let merged = store.upsert_artist(&p).await.unwrap();
        assert_eq!(merged.profile.follower_counts.spotify_followers, Some(1000));
    }
}
