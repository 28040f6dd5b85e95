pub mod app_config;
pub mod database;
pub mod scenario;
pub mod script;

use crate::config::HarnessConfig;
use crate::db::PostgresAdmin;
use crate::environment::TestEnvironment;
use crate::logging::Logger;
use crate::script::ProcessRunner;

pub type LiveEnvironment<'a> = TestEnvironment<'a, PostgresAdmin, ProcessRunner<'a>>;

/// Environment backed by the configured PostgreSQL server and real
/// script processes.
pub fn live_environment<'a>(
    log: &'a Logger,
    cfg: HarnessConfig,
) -> Result<LiveEnvironment<'a>, String> {
    let admin = PostgresAdmin::new(cfg.connection());
    TestEnvironment::new(log, cfg, admin, ProcessRunner::new(log))
}

/// Which database an application config should point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Test,
    Api,
    Unknown,
    Named(String),
}

impl Target {
    pub fn from_flags(db: Option<String>, api: bool, unknown: bool) -> Self {
        match (db, api, unknown) {
            (Some(name), _, _) => Target::Named(name),
            (None, true, _) => Target::Api,
            (None, false, true) => Target::Unknown,
            (None, false, false) => Target::Test,
        }
    }

    pub fn apply(&self, env: &mut LiveEnvironment<'_>) -> Result<(), String> {
        match self {
            Target::Test => {
                let db = env.config().test_db.clone();
                env.write_config(&db)
            }
            Target::Api => env.setup_api_db(),
            Target::Unknown => env.setup_unknown_db(),
            Target::Named(name) => env.write_config(name),
        }
    }
}
