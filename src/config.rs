use crate::db::ConnectionParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Harness settings. Key names match the userdata keys of the behave suite
/// so an existing configuration file can be reused unchanged.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(rename = "BUILDDIR", default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(rename = "DB_HOST", default)]
    pub db_host: Option<String>,
    #[serde(rename = "DB_PORT", default, deserialize_with = "string_or_number")]
    pub db_port: Option<String>,
    #[serde(rename = "DB_USER", default)]
    pub db_user: Option<String>,
    #[serde(rename = "DB_PASS", default)]
    pub db_pass: Option<String>,
    #[serde(rename = "TEMPLATE_DB", default = "default_template_db")]
    pub template_db: String,
    #[serde(rename = "TEST_DB", default = "default_test_db")]
    pub test_db: String,
    #[serde(rename = "API_TEST_DB", default = "default_api_test_db")]
    pub api_test_db: String,
    #[serde(rename = "SERVER_MODULE_PATH", default)]
    pub server_module_path: Option<String>,
    #[serde(rename = "REMOVE_TEMPLATE", default)]
    pub remove_template: bool,
    #[serde(rename = "KEEP_TEST_DB", default)]
    pub keep_test_db: bool,
    #[serde(rename = "PHPCOV", default)]
    pub coverage_dir: Option<PathBuf>,
    #[serde(rename = "SCRIPT_COMMAND", default = "default_script_command")]
    pub script_command: String,
    #[serde(rename = "SCRIPT_EXTENSION", default = "default_script_extension")]
    pub script_extension: String,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_template_db() -> String {
    "test_template_nominatim".into()
}

fn default_test_db() -> String {
    "test_nominatim".into()
}

fn default_api_test_db() -> String {
    "test_api_nominatim".into()
}

fn default_script_command() -> String {
    "/usr/bin/env php -Cq".into()
}

fn default_script_extension() -> String {
    "php".into()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u64),
        Text(String),
    }
    Ok(Option::<Port>::deserialize(deserializer)?.map(|p| match p {
        Port::Number(n) => n.to_string(),
        Port::Text(s) => s,
    }))
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            db_host: None,
            db_port: None,
            db_user: None,
            db_pass: None,
            template_db: default_template_db(),
            test_db: default_test_db(),
            api_test_db: default_api_test_db(),
            server_module_path: None,
            remove_template: false,
            keep_test_db: false,
            coverage_dir: None,
            script_command: default_script_command(),
            script_extension: default_script_extension(),
        }
    }
}

/// Values given on the command line or through `GEOFIXTURE_*` variables.
/// `None` leaves the file value alone.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub build_dir: Option<PathBuf>,
    pub db_host: Option<String>,
    pub db_port: Option<String>,
    pub db_user: Option<String>,
    pub db_pass: Option<String>,
    pub template_db: Option<String>,
    pub test_db: Option<String>,
    pub api_test_db: Option<String>,
    pub server_module_path: Option<String>,
    pub remove_template: Option<bool>,
    pub keep_test_db: Option<bool>,
    pub coverage_dir: Option<PathBuf>,
    pub script_command: Option<String>,
    pub script_extension: Option<String>,
}

impl HarnessConfig {
    pub fn from_yaml(content: &str) -> Result<Self, String> {
        let cfg: HarnessConfig =
            serde_yaml::from_str(content).map_err(|e| format!("parsing config YAML: {}", e))?;
        let cfg = cfg.normalized();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json(content: &str) -> Result<Self, String> {
        let cfg: HarnessConfig =
            serde_json::from_str(content).map_err(|e| format!("parsing config JSON: {}", e))?;
        let cfg = cfg.normalized();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads the config file when one is given, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("reading config '{}': {}", path.display(), e))?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    pub fn apply_overrides(mut self, o: Overrides) -> Result<Self, String> {
        if let Some(v) = o.build_dir {
            self.build_dir = v;
        }
        if o.db_host.is_some() {
            self.db_host = o.db_host;
        }
        if o.db_port.is_some() {
            self.db_port = o.db_port;
        }
        if o.db_user.is_some() {
            self.db_user = o.db_user;
        }
        if o.db_pass.is_some() {
            self.db_pass = o.db_pass;
        }
        if let Some(v) = o.template_db {
            self.template_db = v;
        }
        if let Some(v) = o.test_db {
            self.test_db = v;
        }
        if let Some(v) = o.api_test_db {
            self.api_test_db = v;
        }
        if o.server_module_path.is_some() {
            self.server_module_path = o.server_module_path;
        }
        if o.coverage_dir.is_some() {
            self.coverage_dir = o.coverage_dir;
        }
        if let Some(v) = o.script_command {
            self.script_command = v;
        }
        if let Some(v) = o.script_extension {
            self.script_extension = v;
        }
        if let Some(v) = o.remove_template {
            self.remove_template = v;
        }
        if let Some(v) = o.keep_test_db {
            self.keep_test_db = v;
        }
        let cfg = self.normalized();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Empty strings for optional settings mean "not configured".
    fn normalized(mut self) -> Self {
        fn blank_to_none(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.trim().is_empty())
        }
        self.db_host = blank_to_none(self.db_host);
        self.db_port = blank_to_none(self.db_port);
        self.db_user = blank_to_none(self.db_user);
        self.db_pass = blank_to_none(self.db_pass);
        self.server_module_path = blank_to_none(self.server_module_path);
        self.coverage_dir = self.coverage_dir.filter(|p| !p.as_os_str().is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        for (key, name) in [
            ("TEMPLATE_DB", &self.template_db),
            ("TEST_DB", &self.test_db),
            ("API_TEST_DB", &self.api_test_db),
        ] {
            if name.is_empty() {
                return Err(format!("{} must not be empty", key));
            }
        }
        if self.template_db == self.test_db {
            return Err(format!(
                "TEST_DB must differ from TEMPLATE_DB (both are '{}')",
                self.test_db
            ));
        }
        if let Some(port) = &self.db_port {
            port.parse::<u16>()
                .map_err(|_| format!("DB_PORT must be a port number, got {:?}", port))?;
        }
        if self.script_command.split_whitespace().next().is_none() {
            return Err("SCRIPT_COMMAND must not be empty".into());
        }
        if self.build_dir.as_os_str().is_empty() {
            return Err("BUILDDIR must not be empty".into());
        }
        Ok(())
    }

    pub fn connection(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.db_host.clone(),
            port: self.db_port.clone(),
            user: self.db_user.clone(),
            password: self.db_pass.clone(),
        }
    }

    pub fn reuse_template(&self) -> bool {
        !self.remove_template
    }
}
