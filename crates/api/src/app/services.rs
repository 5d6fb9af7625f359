//! Infrastructure wiring: stores, engine client, event bus, orchestrator.

use std::sync::Arc;

use tracing::{info, warn};

use seqalign_events::{job_event_bus, BroadcastEventBus, JobEvent};
use seqalign_infra::store::{
    InMemoryAlignJobStore, InMemoryFileRecordStore, PostgresAlignJobStore, PostgresFileRecordStore,
};
use seqalign_infra::{
    AlignJobOrchestrator, AlignJobStore, AppConfig, FileRecordStore, HttpSubmissionClient,
    JobHistoryQuery, SubmissionClient,
};

pub type DynJobStore = Arc<dyn AlignJobStore>;
pub type DynFileStore = Arc<dyn FileRecordStore>;
pub type DynSubmissionClient = Arc<dyn SubmissionClient>;
pub type JobEventBus = Arc<BroadcastEventBus<JobEvent>>;

pub type Orchestrator = AlignJobOrchestrator<DynJobStore, DynFileStore, DynSubmissionClient, JobEventBus>;

/// Everything the HTTP handlers need, shared through an `Extension`.
pub struct AppServices {
    pub orchestrator: Orchestrator,
    pub history: JobHistoryQuery<DynJobStore>,
    pub files: DynFileStore,
    pub bus: JobEventBus,
}

impl AppServices {
    pub fn new(
        config: &AppConfig,
        jobs: DynJobStore,
        files: DynFileStore,
        client: DynSubmissionClient,
    ) -> Self {
        let bus: JobEventBus = Arc::new(job_event_bus(config.bus_config()));
        let orchestrator = AlignJobOrchestrator::new(jobs.clone(), files.clone(), client, bus.clone())
            .with_retry_policy(config.submission_retry_policy())
            .with_submit_timeout(config.submit_timeout);

        Self {
            orchestrator,
            history: JobHistoryQuery::new(jobs),
            files,
            bus,
        }
    }

    /// In-memory stores (dev/test) talking to the configured engine.
    pub fn in_memory(config: &AppConfig) -> Self {
        Self::new(
            config,
            InMemoryAlignJobStore::arc(),
            InMemoryFileRecordStore::arc(),
            Arc::new(HttpSubmissionClient::new(config.engine_submit_url())),
        )
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    if config.use_persistent_stores {
        match config.database_url.as_deref() {
            Some(url) => return build_persistent_services(config, url).await,
            None => warn!("USE_PERSISTENT_STORES=true but DATABASE_URL not set, falling back to in-memory"),
        }
    }

    info!(engine = %config.engine_submit_url(), "using in-memory stores");
    Ok(AppServices::in_memory(config))
}

async fn build_persistent_services(config: &AppConfig, database_url: &str) -> anyhow::Result<AppServices> {
    let pool = seqalign_infra::store::connect(database_url).await?;
    info!(engine = %config.engine_submit_url(), "using postgres stores");

    Ok(AppServices::new(
        config,
        Arc::new(PostgresAlignJobStore::new(pool.clone())),
        Arc::new(PostgresFileRecordStore::new(pool)),
        Arc::new(HttpSubmissionClient::new(config.engine_submit_url())),
    ))
}
