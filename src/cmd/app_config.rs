use super::Target;
use crate::app_config::render_dotenv;
use crate::config::HarnessConfig;
use crate::logging::Logger;
use std::io::Write;

/// Writes the application config for `target` and prints it in dotenv
/// format on stdout.
pub fn run(log: &Logger, cfg: HarnessConfig, target: &Target) -> Result<(), String> {
    let mut env = super::live_environment(log, cfg)?;
    target.apply(&mut env)?;
    if let Some(dir) = env.website_dir() {
        log.debug(
            "website directory is removed on exit",
            &[("website_dir", &dir.to_string_lossy())],
        );
    }
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(render_dotenv(&env.child_env()).as_bytes())
        .and_then(|_| stdout.flush())
        .map_err(|e| format!("writing config to stdout: {}", e))
}
