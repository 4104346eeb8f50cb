//! Artist deduplication within a session and against the store.
//!
//! The in-session registry holds fingerprints accepted during this run and is
//! dropped with the session. Cross-session checks read through the store by
//! each strong identifier in turn, then by exact normalized name — fuzzy
//! matching is deliberately left to the store's own merge logic.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use soundscout_common::error::Result;
use soundscout_common::types::ArtistProfile;

use crate::ports::{ArtistIdentifier, Store};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    Fresh,
    /// Known artist. The id is present for store matches; None means the
    /// duplicate was registered earlier in this same session.
    DuplicateOf(Option<Uuid>),
}

pub struct Deduplicator {
    store: Arc<dyn Store>,
    session_fingerprints: Mutex<HashSet<String>>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            session_fingerprints: Mutex::new(HashSet::new()),
        }
    }

    /// Check a profile against the session registry and the store, and
    /// register its fingerprint when fresh.
    ///
    /// Missing identifiers never block a check — each absent id simply falls
    /// through to the next one.
    pub async fn check_and_register(&self, profile: &ArtistProfile) -> Result<DedupOutcome> {
        let fingerprint = profile.fingerprint();

        {
            let mut session = self.session_fingerprints.lock().await;
            if session.contains(&fingerprint) {
                debug!(artist = %profile.name, "Duplicate within session");
                return Ok(DedupOutcome::DuplicateOf(None));
            }
            // Reserve immediately so concurrent checks of the same artist
            // can't both come back Fresh.
            session.insert(fingerprint.clone());
        }

        match self.find_in_store(profile).await {
            Ok(Some(id)) => Ok(DedupOutcome::DuplicateOf(Some(id))),
            Ok(None) => Ok(DedupOutcome::Fresh),
            Err(e) => {
                // Roll the reservation back; the caller decides what a store
                // failure means for the session.
                self.session_fingerprints.lock().await.remove(&fingerprint);
                Err(e)
            }
        }
    }

    async fn find_in_store(&self, profile: &ArtistProfile) -> Result<Option<Uuid>> {
        let mut identifiers: Vec<ArtistIdentifier> = Vec::new();
        if let Some(id) = &profile.youtube_channel_id {
            identifiers.push(ArtistIdentifier::YoutubeChannelId(id.clone()));
        }
        if let Some(id) = &profile.spotify_id {
            identifiers.push(ArtistIdentifier::SpotifyId(id.clone()));
        }
        if let Some(h) = &profile.instagram_handle {
            identifiers.push(ArtistIdentifier::InstagramHandle(h.to_lowercase()));
        }
        if let Some(h) = &profile.tiktok_handle {
            identifiers.push(ArtistIdentifier::TiktokHandle(h.to_lowercase()));
        }
        let normalized = profile.normalized_name();
        if !normalized.is_empty() {
            identifiers.push(ArtistIdentifier::NormalizedName(normalized));
        }

        for identifier in identifiers {
            if let Some(record) = self.store.find_artist_by(&identifier).await? {
                debug!(artist = %profile.name, ?identifier, "Duplicate in store");
                return Ok(Some(record.id));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_mem::MemoryStore;

    fn with_ig(name: &str, handle: &str) -> ArtistProfile {
        let mut p = ArtistProfile::named(name);
        p.instagram_handle = Some(handle.into());
        p
    }

    #[tokio::test]
    async fn fresh_then_duplicate_in_session() {
        let dedup = Deduplicator::new(Arc::new(MemoryStore::new()));
        let drake = ArtistProfile::named("Drake");
        assert_eq!(dedup.check_and_register(&drake).await.unwrap(), DedupOutcome::Fresh);
        assert_eq!(
            dedup.check_and_register(&drake).await.unwrap(),
            DedupOutcome::DuplicateOf(None)
        );
    }

    #[tokio::test]
    async fn name_only_duplicate_requires_exact_normalized_match() {
        let dedup = Deduplicator::new(Arc::new(MemoryStore::new()));
        assert_eq!(
            dedup
                .check_and_register(&ArtistProfile::named("Drake"))
                .await
                .unwrap(),
            DedupOutcome::Fresh
        );
        // same normalized name, different surface form
        assert_eq!(
            dedup
                .check_and_register(&ArtistProfile::named("  DRAKE. "))
                .await
                .unwrap(),
            DedupOutcome::DuplicateOf(None)
        );
        // a genuinely different name stays fresh
        assert_eq!(
            dedup
                .check_and_register(&ArtistProfile::named("Drake Bell"))
                .await
                .unwrap(),
            DedupOutcome::Fresh
        );
    }

    #[tokio::test]
    async fn store_duplicate_found_by_strong_identifier() {
        let store = Arc::new(MemoryStore::new());
        let stored = store.upsert_artist(&with_ig("Alice", "alice_music")).await.unwrap();

        let dedup = Deduplicator::new(store);
        // different name, same instagram handle
        let outcome = dedup
            .check_and_register(&with_ig("Alice Official", "ALICE_MUSIC"))
            .await
            .unwrap();
        assert_eq!(outcome, DedupOutcome::DuplicateOf(Some(stored.id)));
    }

    #[tokio::test]
    async fn store_duplicate_found_by_normalized_name() {
        let store = Arc::new(MemoryStore::new());
        let stored = store
            .upsert_artist(&ArtistProfile::named("Tyler, The Creator"))
            .await
            .unwrap();

        let dedup = Deduplicator::new(store);
        let outcome = dedup
            .check_and_register(&ArtistProfile::named("tyler the creator"))
            .await
            .unwrap();
        assert_eq!(outcome, DedupOutcome::DuplicateOf(Some(stored.id)));
    }

    #[tokio::test]
    async fn fresh_registrations_have_distinct_fingerprints() {
        let dedup = Deduplicator::new(Arc::new(MemoryStore::new()));
        let profiles = [
            ArtistProfile::named("Alice"),
            ArtistProfile::named("Bob"),
            with_ig("Alice", "alice2"), // strong id differs from name-only Alice
            ArtistProfile::named("alice"), // duplicate of the first
        ];
        let mut fresh_fingerprints = HashSet::new();
        for p in &profiles {
            if dedup.check_and_register(p).await.unwrap() == DedupOutcome::Fresh {
                assert!(
                    fresh_fingerprints.insert(p.fingerprint()),
                    "two Fresh outcomes with equal fingerprint"
                );
            }
        }
        assert_eq!(fresh_fingerprints.len(), 3);
    }
}
