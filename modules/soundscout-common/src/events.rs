//! Progress events streamed to session subscribers.
//!
//! Per-artist events are totally ordered: `CandidateFound` →
//! (`ArtistAccepted` | `ArtistRejected`) → `ArtistEnriched` → `ArtistStored`.
//! Terminal events (`SessionCompleted`, `SessionFailed`) close the stream.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::types::SessionCounters;

/// Final counter summary carried on `SessionCompleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub counters: SessionCounters,
    pub budget_exhausted: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    SessionStarted {
        session_id: Uuid,
        query: String,
        target_count: u32,
    },
    PhaseProgress {
        phase: String,
        done: u64,
        target: u64,
    },
    CandidateFound {
        video_id: String,
        title: String,
    },
    ArtistAccepted {
        video_id: String,
        name: String,
    },
    ArtistRejected {
        video_id: String,
        reason: String,
    },
    ArtistEnriched {
        name: String,
        score: f32,
    },
    ArtistStored {
        name: String,
        artist_id: Uuid,
    },
    SessionCompleted {
        summary: SessionSummary,
    },
    SessionFailed {
        kind: ErrorKind,
        message: String,
        counters: SessionCounters,
    },
    /// Delivered as the last event to a subscriber that fell too far behind.
    Lagged {
        missed: u64,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::SessionCompleted { .. } | ProgressEvent::SessionFailed { .. }
        )
    }
}
