pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::Config;
pub use error::{ErrorKind, Result, SoundscoutError};
pub use events::{ProgressEvent, SessionSummary};
pub use types::{
    ArtistProfile, CandidateVideo, FollowerCounts, LyricAnalysis, Platform, QualityHint,
    SearchFilters, SessionCounters, SessionRequest, SessionSnapshot, SessionState, SocialLinks,
    SortOrder, UploadDate, VideoDuration,
};
