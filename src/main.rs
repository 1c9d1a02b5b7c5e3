//! Wiring & DI. Entry point: bootstrap adapters, inject into engines, run UI.
//! No business logic here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cert_prep::adapters::content::JsonCatalog;
use cert_prep::adapters::identity::FileProfile;
use cert_prep::adapters::persistence::SqliteStore;
use cert_prep::adapters::remote::{HttpResultsGateway, MockResultsGateway};
use cert_prep::adapters::ui::TuiInputPort;
use cert_prep::ports::{
    AttemptStore, ConfigSource, Identity, InputPort, QuestionPool, ResultsGateway, SessionObserver,
    SubmissionStore, TracingObserver,
};
use cert_prep::shared::config::AppConfig;
use cert_prep::shared::{Clock, SystemClock};
use cert_prep::usecases::{ExamSessionEngine, RetryPolicy, ScoringEngine, SyncEngine};
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!("no .env found"),
    }

    let cfg = AppConfig::load().unwrap_or_default();
    let data_path = PathBuf::from(cfg.data_dir_or_default());
    info!(path = %data_path.display(), "data directory");

    // --- Local persistence (one sqlite file, WAL) ---
    let store = Arc::new(
        SqliteStore::connect(&data_path)
            .await
            .map_err(|e| anyhow::anyhow!("sqlite connect failed: {e}"))?,
    );
    let attempts: Arc<dyn AttemptStore> = Arc::clone(&store) as Arc<dyn AttemptStore>;
    let submissions: Arc<dyn SubmissionStore> = Arc::clone(&store) as Arc<dyn SubmissionStore>;

    // --- Content catalog (questions + exam-type configs) ---
    let catalog = Arc::new(
        JsonCatalog::load(cfg.catalog_path_or_default())
            .map_err(|e| anyhow::anyhow!("catalog load failed: {e}"))?,
    );
    let exam_types: Vec<(String, String)> = catalog
        .exam_types()
        .map(|c| (c.id.clone(), c.name.clone()))
        .collect();
    let pool: Arc<dyn QuestionPool> = Arc::clone(&catalog) as Arc<dyn QuestionPool>;
    let configs: Arc<dyn ConfigSource> = Arc::clone(&catalog) as Arc<dyn ConfigSource>;

    // --- Identity profile ---
    let identity: Arc<dyn Identity> = Arc::new(
        FileProfile::load(&data_path).map_err(|e| anyhow::anyhow!("profile load failed: {e}"))?,
    );

    // --- Remote results gateway (mock when no endpoint is configured) ---
    let remote: Arc<dyn ResultsGateway> = if cfg.is_remote_configured() {
        let base_url = cfg.api_base_url.clone().unwrap_or_default();
        info!(%base_url, "remote results endpoint enabled");
        Arc::new(
            HttpResultsGateway::new(base_url)
                .map_err(|e| anyhow::anyhow!("http client build failed: {e}"))?,
        )
    } else {
        warn!("CERT_PREP_API_BASE_URL not set, using mock results gateway");
        Arc::new(MockResultsGateway::new())
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let observer: Arc<dyn SessionObserver> = Arc::new(TracingObserver);

    // --- Engines ---
    let scoring = Arc::new(ScoringEngine::new(
        Arc::clone(&attempts),
        Arc::clone(&submissions),
        Arc::clone(&configs),
        Arc::clone(&pool),
    ));
    let session = Arc::new(ExamSessionEngine::new(
        Arc::clone(&attempts),
        Arc::clone(&configs),
        Arc::clone(&pool),
        Arc::clone(&scoring),
        Arc::clone(&clock),
        Arc::clone(&observer),
    ));
    let policy = RetryPolicy {
        base_delay: Duration::from_millis(cfg.retry_base_delay_ms_or_default()),
        retry_cap: cfg.retry_cap_or_default(),
        enforce_cap: cfg.enforce_retry_cap_or_default(),
    };
    let sync = Arc::new(SyncEngine::new(
        Arc::clone(&submissions),
        Arc::clone(&attempts),
        remote,
        Arc::clone(&identity),
        clock,
        observer,
        policy,
    ));

    // --- Run (main menu -> start/resume/sync/history/sign-out) ---
    let input_port: Arc<dyn InputPort> = Arc::new(TuiInputPort::new(
        session,
        scoring,
        sync,
        identity,
        exam_types,
        Duration::from_secs(cfg.checkpoint_secs_or_default()),
    ));
    input_port.run().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    Ok(())
}
