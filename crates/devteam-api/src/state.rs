//! Application state wiring the engine to its infrastructure.
//!
//! The engine is generic over its repository; `AppState` pins it to the
//! SQLite implementation and builds the executor registry from config.

use std::path::PathBuf;
use std::sync::Arc;

use devteam_core::workflow::{RecoveryPolicy, WorkflowEngine};
use devteam_infra::agent::build_registry;
use devteam_infra::config::load_global_config;
use devteam_infra::filesystem::{error_log_path, resolve_data_dir};
use devteam_infra::sqlite::pool::{DatabasePool, database_url};
use devteam_infra::sqlite::workflow::SqliteWorkflowStateRepository;
use devteam_types::config::GlobalConfig;

/// The engine pinned to the SQLite repository.
pub type ConcreteEngine = WorkflowEngine<SqliteWorkflowStateRepository>;

/// Shared application state used by every command.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConcreteEngine>,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load config, connect to the
    /// database, restore the persisted workflow.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_global_config(&data_dir).await;

        let db_pool = DatabasePool::new(&format!("{}?mode=rwc", database_url(&data_dir))).await?;

        let agents = build_registry(&config.agents);
        if agents.is_empty() {
            tracing::warn!(
                "no executors configured; add [agents.<name>] entries to {}",
                data_dir.join("config.toml").display()
            );
        }

        let recovery =
            RecoveryPolicy::new(config.recovery.clone()).with_error_log(error_log_path(&data_dir));

        let engine = WorkflowEngine::restore(
            SqliteWorkflowStateRepository::new(db_pool),
            agents,
            recovery,
            config.engine.clone(),
        )
        .await?;

        Ok(Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
            data_dir,
        })
    }
}
