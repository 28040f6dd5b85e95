use super::Target;
use crate::config::HarnessConfig;
use crate::logging::Logger;
use crate::script::{exit_failure, run_command, Invocation};
use std::path::PathBuf;

pub const COVERAGE_FILE_VAR: &str = "GEOFIXTURE_COVERAGE_FILE";

/// Runs `args` as one test scenario.
///
/// For the scenario database a fresh copy of the template is created before
/// the command and dropped after it, whatever the outcome. The API and
/// unknown targets only point the configuration at their database.
pub fn run(
    log: &Logger,
    cfg: HarnessConfig,
    target: &Target,
    workdir: &str,
    args: &[String],
) -> Result<(), String> {
    if args.is_empty() {
        return Err("command is required after \"--\"".into());
    }
    let cwd = if workdir.is_empty() {
        std::env::current_dir().map_err(|e| format!("getting cwd: {}", e))?
    } else {
        PathBuf::from(workdir)
    };
    let mut env = super::live_environment(log, cfg)?;

    let session = match target {
        Target::Test => Some(env.setup_db()?),
        other => {
            other.apply(&mut env)?;
            None
        }
    };
    let fresh_db = session.is_some();

    let mut child_env = env.child_env();
    if let Some(file) = env.next_code_coverage_file() {
        child_env.insert(COVERAGE_FILE_VAR.into(), file.to_string_lossy().into_owned());
    }
    let invocation = Invocation {
        argv: args.to_vec(),
        cwd,
        env: child_env,
    };
    log.info("starting scenario", &[("command", &args[0])]);
    let outcome = run_command(log, &invocation).and_then(|status| match exit_failure(status) {
        Some(reason) => Err(format!("scenario command {}", reason)),
        None => Ok(()),
    });

    let teardown = if fresh_db {
        env.teardown_db(session)
    } else {
        Ok(())
    };
    match (outcome, teardown) {
        (Ok(()), Ok(())) => {
            log.info("scenario completed successfully", &[]);
            Ok(())
        }
        (Ok(()), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(teardown_err)) => {
            log.error("scenario teardown failed", &[("error", &teardown_err)]);
            Err(e)
        }
    }
}
