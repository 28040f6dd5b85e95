use crate::config::HarnessConfig;
use crate::logging::Logger;

pub fn setup_template(log: &Logger, cfg: HarnessConfig) -> Result<(), String> {
    let mut env = super::live_environment(log, cfg)?;
    env.setup_template_db()
}

/// Prepares a fresh scenario database and leaves it in place for an
/// external test run.
pub fn setup_db(log: &Logger, cfg: HarnessConfig) -> Result<(), String> {
    let mut env = super::live_environment(log, cfg)?;
    let session = env.setup_db()?;
    drop(session);
    log.info(
        "scenario database ready",
        &[("database", &env.config().test_db)],
    );
    Ok(())
}

pub fn teardown_db(log: &Logger, cfg: HarnessConfig) -> Result<(), String> {
    let mut env = super::live_environment(log, cfg)?;
    env.teardown_db(None)
}

pub fn drop_db(log: &Logger, cfg: HarnessConfig, name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("--name must not be empty".into());
    }
    let mut env = super::live_environment(log, cfg)?;
    env.drop_database(name)
}
