use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use soundscout_common::{Config, ProgressEvent, SessionRequest, SoundscoutError};
use soundscout_engine::analyzer::LlmAnalyzer;
use soundscout_engine::cache::ResponseCache;
use soundscout_engine::fetchers::WebFetcher;
use soundscout_engine::search_url::SpTokenComposer;
use soundscout_engine::{
    Analyzer, MemoryStore, Orchestrator, PipelineDeps, QuotaLimiter, SessionSettings, SpotifyApi,
    Store,
};

/// Discover emerging artists from a search query and stream progress events
/// as newline-delimited JSON on stdout.
#[derive(Parser)]
#[command(name = "soundscout", about = "Run a discovery session")]
struct Cli {
    /// Search query.
    #[arg(long)]
    query: String,

    /// Number of artists to discover.
    #[arg(long, default_value_t = 50)]
    target: u32,

    /// Search filter, repeatable (e.g. --filter upload_date=week).
    #[arg(long = "filter", value_name = "K=V")]
    filters: Vec<String>,

    /// Session cost ceiling in budget units.
    #[arg(long)]
    max_cost: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_redacted();

    let request = match build_request(&cli) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("invalid request: {e}");
            return ExitCode::from(1);
        }
    };

    let orchestrator = Arc::new(build_orchestrator(&config));
    let session_id = match orchestrator.start(request) {
        Ok(id) => id,
        Err(SoundscoutError::InvalidRequest(msg)) => {
            eprintln!("invalid request: {msg}");
            return ExitCode::from(1);
        }
        Err(e) => {
            eprintln!("failed to start session: {e}");
            return ExitCode::from(2);
        }
    };
    info!(%session_id, "Discovery session started");

    let mut rx = orchestrator
        .subscribe(session_id)
        .expect("session exists, it was just started");
    let mut failed = false;
    while let Some(event) = rx.recv().await {
        if matches!(event, ProgressEvent::SessionFailed { .. }) {
            failed = true;
        }
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("failed to encode event: {e}"),
        }
    }

    if failed {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

fn build_request(cli: &Cli) -> Result<SessionRequest, SoundscoutError> {
    let mut request = SessionRequest::new(cli.query.clone()).with_target(cli.target);
    for pair in &cli.filters {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            SoundscoutError::InvalidRequest(format!("filter must be K=V, got {pair}"))
        })?;
        request.filters.set(key.trim(), value.trim())?;
    }
    if let Some(units) = cli.max_cost {
        request = request.with_max_cost(units);
    }
    request.validate()?;
    Ok(request)
}

fn build_orchestrator(config: &Config) -> Orchestrator {
    let fetcher = WebFetcher::new(
        config.browserless_url.as_deref(),
        config.browserless_token.as_deref(),
    );

    let spotify: Option<Arc<dyn SpotifyApi>> = match (
        config.spotify_client_id.clone(),
        config.spotify_client_secret.clone(),
    ) {
        (Some(id), Some(secret)) => Some(Arc::new(spotify_client::SpotifyClient::new(id, secret))),
        _ => {
            info!("Spotify credentials unset, Spotify enrichment disabled");
            None
        }
    };

    let analyzer: Option<Arc<dyn Analyzer>> = config.analyzer_api_key.clone().map(|key| {
        Arc::new(LlmAnalyzer::new(key, config.analyzer_base_url.clone())) as Arc<dyn Analyzer>
    });
    if analyzer.is_none() {
        info!("ANALYZER_API_KEY unset, lyric analysis disabled");
    }

    // The relational driver binds via STORE_URL in deployment; without it,
    // discoveries land in a process-local store and are reported on stdout
    // only.
    if config.store_url.is_some() {
        info!("STORE_URL is handled by the external store driver");
    }
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    let settings = SessionSettings {
        max_concurrent_sessions: config.max_concurrent_sessions,
        ..Default::default()
    };

    Orchestrator::new(
        PipelineDeps {
            fetcher: Arc::new(fetcher),
            store,
            analyzer,
            spotify,
            composer: Arc::new(SpTokenComposer::new(&config.search_host)),
            quota: Arc::new(QuotaLimiter::new(config.daily_cost_budget)),
            cache: Arc::new(ResponseCache::new()),
        },
        settings,
    )
}
