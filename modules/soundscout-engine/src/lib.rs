//! Discovery pipeline engine: harvest candidate videos from a search surface,
//! extract artist identities, enrich them across sources, score, dedup, and
//! persist, streaming progress to subscribers.

pub mod analyzer;
pub mod cache;
pub mod cancel;
pub mod dedup;
pub mod enrich;
pub mod fetch;
pub mod fetchers;
pub mod filter;
pub mod fixtures;
pub mod harvest;
pub mod links;
pub mod merge;
pub mod numbers;
pub mod ports;
pub mod progress;
pub mod quota;
pub mod score;
pub mod search_url;
pub mod session;
pub mod store_mem;

pub use cancel::CancelToken;
pub use dedup::{DedupOutcome, Deduplicator};
pub use enrich::EnrichmentCoordinator;
pub use fetch::{FetchHints, FetchedPage, StrategyFetcher};
pub use harvest::{Harvester, HarvestSettings};
pub use ports::{
    Analyzer, ArtistIdentifier, ArtistRecord, FetchSession, Fetcher, SpotifyApi, SpotifyArtistInfo,
    Store,
};
pub use progress::{ProgressBus, ProgressReceiver};
pub use quota::{BudgetGate, QuotaLimiter};
pub use session::{Orchestrator, PipelineDeps, SessionSettings};
pub use store_mem::MemoryStore;
