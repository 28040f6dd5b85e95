use super::Target;
use crate::config::HarnessConfig;
use crate::logging::Logger;
use crate::script::ScriptArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Setup,
    Update,
}

pub fn run(
    log: &Logger,
    cfg: HarnessConfig,
    script: Script,
    target: &Target,
    tokens: &[String],
) -> Result<(), String> {
    if tokens.is_empty() {
        return Err("script arguments are required after \"--\"".into());
    }
    let args = ScriptArgs::parse_tokens(tokens)?;
    let mut env = super::live_environment(log, cfg)?;
    target.apply(&mut env)?;
    match script {
        Script::Setup => env.run_setup_script(&args)?,
        Script::Update => env.run_update_script(&args)?,
    }
    log.info("script completed successfully", &[]);
    Ok(())
}
