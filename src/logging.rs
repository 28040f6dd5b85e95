use chrono::Utc;
use std::io::Write;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Debug => write!(f, "DEBUG"),
            Level::Info => write!(f, "INFO"),
            Level::Warn => write!(f, "WARN"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            other => Err(format!(
                "unknown log level '{}' (expected debug, info, warn or error)",
                other
            )),
        }
    }
}

/// Line-oriented logger writing either `time [LEVEL] msg k=v` text or one
/// JSON object per line. Script output is streamed through it as well, so
/// the writer is shared behind a mutex.
pub struct Logger {
    out: Mutex<Box<dyn Write + Send>>,
    json_mode: Mutex<bool>,
    level: Level,
}

impl Logger {
    pub fn new(out: Box<dyn Write + Send>, json_mode: bool, level: Level) -> Self {
        Self {
            out: Mutex::new(out),
            json_mode: Mutex::new(json_mode),
            level,
        }
    }

    pub fn stderr(level: Level) -> Self {
        Self::new(Box::new(std::io::stderr()), false, level)
    }

    pub fn set_json(&self, enabled: bool) {
        if let Ok(mut mode) = self.json_mode.lock() {
            *mode = enabled;
        }
    }

    fn log(&self, level: Level, msg: &str, kvs: &[(&str, &str)]) {
        if level < self.level {
            return;
        }
        let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let json_mode = self.json_mode.lock().map(|m| *m).unwrap_or(false);
        let Ok(mut out) = self.out.lock() else {
            return;
        };

        if json_mode {
            let mut map = serde_json::Map::new();
            map.insert("time".into(), serde_json::Value::String(now));
            map.insert("level".into(), serde_json::Value::String(level.to_string()));
            map.insert("msg".into(), serde_json::Value::String(msg.into()));
            for (k, v) in kvs {
                map.insert((*k).into(), serde_json::Value::String(redact_value(k, v)));
            }
            let _ = writeln!(out, "{}", serde_json::Value::Object(map));
        } else {
            let mut line = format!("{} [{}] {}", now, level, msg);
            for (k, v) in kvs {
                line.push_str(&format!(" {}={}", k, redact_value(k, v)));
            }
            let _ = writeln!(out, "{}", line);
        }
    }

    pub fn debug(&self, msg: &str, kvs: &[(&str, &str)]) {
        self.log(Level::Debug, msg, kvs);
    }
    pub fn info(&self, msg: &str, kvs: &[(&str, &str)]) {
        self.log(Level::Info, msg, kvs);
    }
    pub fn warn(&self, msg: &str, kvs: &[(&str, &str)]) {
        self.log(Level::Warn, msg, kvs);
    }
    pub fn error(&self, msg: &str, kvs: &[(&str, &str)]) {
        self.log(Level::Error, msg, kvs);
    }
}

const SENSITIVE_KEYS: &[&str] = &["password", "db_pass", "db-pass", "secret", "token"];

/// Keys whose values are connection strings with an embedded password.
const DSN_KEYS: &[&str] = &["dsn", "nominatim_database_dsn"];

pub fn redact_value(key: &str, value: &str) -> String {
    let key = key.to_lowercase();
    if SENSITIVE_KEYS.contains(&key.as_str()) {
        if value.is_empty() {
            return String::new();
        }
        return "REDACTED".into();
    }
    if DSN_KEYS.contains(&key.as_str()) {
        return mask_dsn(value);
    }
    value.into()
}

/// Masks the `password=` segment of a `pgsql:` style connection string.
pub fn mask_dsn(dsn: &str) -> String {
    dsn.split(';')
        .map(|part| {
            if part.starts_with("password=") {
                "password=REDACTED"
            } else {
                part
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}
