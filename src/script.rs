use crate::logging::Logger;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// Arguments for one of the application's utility scripts.
///
/// Flags render as bare `--name` tokens and come first. Options render as
/// `--key value` pairs with underscores in the key turned into hyphens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptArgs {
    flags: Vec<String>,
    options: Vec<(String, String)>,
}

impl ScriptArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(mut self, name: &str) -> Self {
        self.flags.push(name.to_string());
        self
    }

    pub fn flags(mut self, names: &[&str]) -> Self {
        self.flags.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn option(mut self, key: &str, value: impl ToString) -> Self {
        self.options.push((key.to_string(), value.to_string()));
        self
    }

    /// Builds arguments from command-line tokens: `key=value` is an option,
    /// anything else is a flag. A leading `--` is accepted and ignored.
    pub fn parse_tokens(tokens: &[String]) -> Result<Self, String> {
        let mut args = Self::new();
        for token in tokens {
            let token = token.strip_prefix("--").unwrap_or(token);
            if token.is_empty() {
                return Err("empty script argument".into());
            }
            args = match token.split_once('=') {
                Some((key, _)) if key.is_empty() => {
                    return Err(format!("script option {:?} has no name", token));
                }
                Some((key, value)) => args.option(key, value),
                None => args.flag(token),
            };
        }
        Ok(args)
    }

    pub fn to_cli(&self) -> Vec<String> {
        let mut out: Vec<String> = self.flags.iter().map(|f| format!("--{}", f)).collect();
        for (k, v) in &self.options {
            out.push(format!("--{}", k.replace('_', "-")));
            out.push(v.clone());
        }
        out
    }
}

/// How the application's scripts are started: an interpreter command line
/// followed by `<build_dir>/utils/<script>.<extension>`.
#[derive(Debug, Clone)]
pub struct Launcher {
    program: Vec<String>,
    extension: String,
}

impl Launcher {
    pub fn new(command: &str, extension: &str) -> Result<Self, String> {
        let program: Vec<String> = command.split_whitespace().map(String::from).collect();
        if program.is_empty() {
            return Err("script command must not be empty".into());
        }
        Ok(Self {
            program,
            extension: extension.trim_start_matches('.').to_string(),
        })
    }

    pub fn script_path(&self, build_dir: &Path, script: &str) -> Result<PathBuf, String> {
        let file = if self.extension.is_empty() {
            script.to_string()
        } else {
            format!("{}.{}", script, self.extension)
        };
        std::path::absolute(build_dir.join("utils").join(file))
            .map_err(|e| format!("resolving script path for '{}': {}", script, e))
    }

    pub fn command_line(
        &self,
        build_dir: &Path,
        script: &str,
        args: &ScriptArgs,
    ) -> Result<Vec<String>, String> {
        let mut argv = self.program.clone();
        argv.push(self.script_path(build_dir, script)?.to_string_lossy().into_owned());
        argv.extend(args.to_cli());
        Ok(argv)
    }
}

/// A fully resolved child process: command line, working directory and the
/// variables added on top of the inherited environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

pub trait ScriptRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<(), String>;
}

/// Runs invocations as real processes, streaming their output into the log.
pub struct ProcessRunner<'a> {
    log: &'a Logger,
}

impl<'a> ProcessRunner<'a> {
    pub fn new(log: &'a Logger) -> Self {
        Self { log }
    }
}

impl ScriptRunner for ProcessRunner<'_> {
    fn run(&mut self, invocation: &Invocation) -> Result<(), String> {
        let status = run_command(self.log, invocation)?;
        match exit_failure(status) {
            Some(reason) => Err(format!("script {:?} {}", invocation.argv.join(" "), reason)),
            None => Ok(()),
        }
    }
}

pub fn run_command(log: &Logger, invocation: &Invocation) -> Result<ExitStatus, String> {
    let Some((program, rest)) = invocation.argv.split_first() else {
        return Err("command is required".into());
    };
    log.info(
        "running command",
        &[
            ("command", &invocation.argv.join(" ")),
            ("cwd", &invocation.cwd.to_string_lossy()),
        ],
    );
    let mut cmd = Command::new(program);
    cmd.args(rest);
    cmd.current_dir(&invocation.cwd);
    cmd.envs(&invocation.env);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .map_err(|e| format!("starting command {:?}: {}", program, e))?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    std::thread::scope(|s| {
        let h1 = s.spawn(|| {
            if let Some(r) = stdout {
                stream_lines(log, r, "stdout");
            }
        });
        let h2 = s.spawn(|| {
            if let Some(r) = stderr {
                stream_lines(log, r, "stderr");
            }
        });
        h1.join().ok();
        h2.join().ok();
    });
    child
        .wait()
        .map_err(|e| format!("waiting for command: {}", e))
}

/// Describes why a finished process did not succeed, or `None` if it did.
pub fn exit_failure(status: ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    if let Some(code) = status.code() {
        return Some(format!("exited with code {}", code));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(format!("killed by signal {}", signal));
        }
    }
    Some(format!("terminated abnormally ({})", status))
}

/// Logs every line of `reader`. Bytes that are not UTF-8 are replaced so
/// the pipe is always drained to the end.
fn stream_lines<R: Read>(log: &Logger, reader: R, stream: &str) {
    let mut buf = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match buf.read_until(b'\n', &mut line) {
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                log.info(text.trim_end_matches(['\n', '\r']), &[("stream", stream)]);
            }
        }
    }
}
