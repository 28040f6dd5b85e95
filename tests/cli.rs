//! Command-line tests that run against fake utility scripts and need no
//! database server.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn geofixture_bin() -> String {
    env!("CARGO_BIN_EXE_geofixture").to_string()
}

const RECORDING_SCRIPT: &str = r#"
echo "$(basename "$0") $*" >> "$GEOFIXTURE_TEST_LOG"
echo "cwd=$(pwd)" >> "$GEOFIXTURE_TEST_LOG"
echo "dsn=$NOMINATIM_DATABASE_DSN style=$NOMINATIM_IMPORT_STYLE tiger=$NOMINATIM_USE_US_TIGER_DATA" >> "$GEOFIXTURE_TEST_LOG"
echo "script says hello"
"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let utils = dir.path().join("build").join("utils");
        std::fs::create_dir_all(&utils).unwrap();
        std::fs::write(utils.join("setup.sh"), RECORDING_SCRIPT).unwrap();
        std::fs::write(
            utils.join("update.sh"),
            format!("{}\nexit 2\n", RECORDING_SCRIPT),
        )
        .unwrap();
        let config = format!(
            "BUILDDIR: {}\nSCRIPT_COMMAND: sh\nSCRIPT_EXTENSION: sh\nDB_HOST: dbhost\nDB_USER: tester\n",
            dir.path().join("build").display()
        );
        std::fs::write(dir.path().join("harness.yaml"), config).unwrap();
        Self { dir }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("harness.yaml")
    }

    fn log_path(&self) -> PathBuf {
        self.dir.path().join("script.log")
    }

    fn script_log(&self) -> String {
        std::fs::read_to_string(self.log_path()).unwrap_or_default()
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(geofixture_bin())
            .arg("--config")
            .arg(self.config_path())
            .args(args)
            .env("GEOFIXTURE_TEST_LOG", self.log_path())
            .env_remove("GEOFIXTURE_JSON")
            .env_remove("GEOFIXTURE_LOG_LEVEL")
            .output()
            .expect("failed to run geofixture")
    }
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).to_string()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

#[test]
fn test_write_config_prints_dotenv() {
    let fx = Fixture::new();
    let out = fx.run(&["write-config", "--db", "mydb", "--db-port", "5433"]);
    assert!(out.status.success(), "write-config failed: {}", stderr(&out));
    let printed = stdout(&out);
    assert!(
        printed.contains("NOMINATIM_DATABASE_DSN=pgsql:dbname=mydb;host=dbhost;port=5433;user=tester\n"),
        "unexpected dotenv: {}",
        printed
    );
    assert!(printed.contains("NOMINATIM_FLATNODE_FILE=\n"));
    assert!(printed.contains("NOMINATIM_IMPORT_STYLE=full\n"));
    assert!(printed.contains("NOMINATIM_USE_US_TIGER_DATA=yes\n"));
    assert!(!printed.contains("password="));

    let log = fx.script_log();
    assert!(log.contains("setup.sh --setup-website"), "script log: {}", log);
    assert!(log.contains("style=full tiger=yes"));
}

#[test]
fn test_write_config_runs_in_website_dir() {
    let fx = Fixture::new();
    let out = fx.run(&["write-config"]);
    assert!(out.status.success(), "write-config failed: {}", stderr(&out));
    let log = fx.script_log();
    let cwd_line = log.lines().find(|l| l.starts_with("cwd=")).unwrap();
    let cwd = Path::new(cwd_line.trim_start_matches("cwd="));
    assert!(
        cwd.file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("geofixture-website-"),
        "unexpected cwd: {}",
        cwd.display()
    );
    assert!(!cwd.exists(), "website directory should be removed on exit");
}

#[test]
fn test_write_config_unknown_database() {
    let fx = Fixture::new();
    let out = fx.run(&["write-config", "--unknown"]);
    assert!(out.status.success(), "write-config failed: {}", stderr(&out));
    assert!(stdout(&out).contains("pgsql:dbname=UNKNOWN_DATABASE_NAME;"));
}

#[test]
fn test_write_config_api_database() {
    let fx = Fixture::new();
    let out = fx.run(&["write-config", "--api", "--api-test-db", "api_db"]);
    assert!(out.status.success(), "write-config failed: {}", stderr(&out));
    assert!(stdout(&out).contains("pgsql:dbname=api_db;"));
}

#[test]
fn test_run_setup_translates_arguments() {
    let fx = Fixture::new();
    let out = fx.run(&[
        "run-setup",
        "--db",
        "importdb",
        "--",
        "import-data",
        "osm_file=/data/planet.osm",
        "osm2pgsql_cache=200",
    ]);
    assert!(out.status.success(), "run-setup failed: {}", stderr(&out));
    let log = fx.script_log();
    assert!(
        log.contains("setup.sh --import-data --osm-file /data/planet.osm --osm2pgsql-cache 200"),
        "script log: {}",
        log
    );
    assert!(log.contains("dsn=pgsql:dbname=importdb;host=dbhost;user=tester"));
    assert!(stderr(&out).contains("script says hello stream=stdout"));
}

#[test]
fn test_run_update_failure_exits_nonzero() {
    let fx = Fixture::new();
    let out = fx.run(&["run-update", "--", "index"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("update script failed"), "stderr: {}", err);
    assert!(err.contains("exited with code 2"), "stderr: {}", err);
    assert!(fx.script_log().contains("update.sh --index"));
}

#[test]
fn test_run_setup_requires_arguments() {
    let fx = Fixture::new();
    let out = fx.run(&["run-setup"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("script arguments are required"));
}

#[test]
fn test_scenario_against_unknown_database() {
    let fx = Fixture::new();
    let out = fx.run(&[
        "scenario",
        "--unknown",
        "--",
        "sh",
        "-c",
        "echo scenario-dsn=$NOMINATIM_DATABASE_DSN",
    ]);
    assert!(out.status.success(), "scenario failed: {}", stderr(&out));
    assert!(stderr(&out).contains("scenario-dsn=pgsql:dbname=UNKNOWN_DATABASE_NAME;"));
}

#[test]
fn test_scenario_exports_coverage_file() {
    let fx = Fixture::new();
    let cov = fx.dir.path().join("cov");
    let out = fx.run(&[
        "scenario",
        "--api",
        "--coverage-dir",
        cov.to_str().unwrap(),
        "--",
        "sh",
        "-c",
        "echo coverage=$GEOFIXTURE_COVERAGE_FILE",
    ]);
    assert!(out.status.success(), "scenario failed: {}", stderr(&out));
    assert!(stderr(&out).contains("000001.cov"));
}

#[test]
fn test_scenario_command_failure_reported() {
    let fx = Fixture::new();
    let out = fx.run(&["scenario", "--unknown", "--", "sh", "-c", "exit 4"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("scenario command exited with code 4"));
}

#[test]
fn test_json_logging_via_env() {
    let fx = Fixture::new();
    let out = Command::new(geofixture_bin())
        .arg("--config")
        .arg(fx.config_path())
        .args(["write-config", "--db-pass", "hunter2"])
        .env("GEOFIXTURE_TEST_LOG", fx.log_path())
        .env("GEOFIXTURE_JSON", "true")
        .output()
        .unwrap();
    assert!(out.status.success(), "write-config failed: {}", stderr(&out));
    let err = stderr(&out);
    assert!(err.contains("\"msg\""), "expected JSON logs: {}", err);
    assert!(err.contains("password=REDACTED"));
    assert!(!err.contains("hunter2"), "password leaked into logs: {}", err);
}

#[test]
fn test_invalid_port_rejected() {
    let fx = Fixture::new();
    let out = fx.run(&["write-config", "--db-port", "not-a-port"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("DB_PORT must be a port number"));
    assert!(fx.script_log().is_empty());
}

#[test]
fn test_missing_config_file() {
    let out = Command::new(geofixture_bin())
        .args(["--config", "/nonexistent/harness.yaml", "write-config"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(stderr(&out).contains("reading config"));
}

#[test]
fn test_env_var_settings() {
    let fx = Fixture::new();
    let out = Command::new(geofixture_bin())
        .arg("--config")
        .arg(fx.config_path())
        .arg("write-config")
        .env("GEOFIXTURE_TEST_LOG", fx.log_path())
        .env("GEOFIXTURE_TEST_DB", "from_env")
        .env("GEOFIXTURE_DB_HOST", "envhost")
        .output()
        .unwrap();
    assert!(out.status.success(), "write-config failed: {}", stderr(&out));
    assert!(stdout(&out).contains("pgsql:dbname=from_env;host=envhost;user=tester"));
}

#[test]
fn test_log_level_controls_debug_output() {
    let fx = Fixture::new();
    let out = fx.run(&["write-config"]);
    assert!(out.status.success(), "write-config failed: {}", stderr(&out));
    assert!(!stderr(&out).contains("website directory is removed on exit"));

    let out = fx.run(&["--log-level", "debug", "write-config"]);
    assert!(out.status.success(), "write-config failed: {}", stderr(&out));
    assert!(stderr(&out).contains("[DEBUG] website directory is removed on exit"));

    let out = fx.run(&["--log-level", "error", "write-config"]);
    assert!(out.status.success());
    assert!(!stderr(&out).contains("[INFO]"));

    let out = fx.run(&["--log-level", "loud", "write-config"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("unknown log level 'loud'"));
}

#[test]
fn test_script_extension_flag() {
    let fx = Fixture::new();
    let utils = fx.dir.path().join("build").join("utils");
    std::fs::copy(utils.join("setup.sh"), utils.join("setup.bash")).unwrap();
    let out = fx.run(&["--script-extension", "bash", "write-config"]);
    assert!(out.status.success(), "write-config failed: {}", stderr(&out));
    assert!(fx.script_log().contains("setup.bash --setup-website"));
}

#[test]
fn test_boolean_settings_accept_explicit_values() {
    let fx = Fixture::new();
    for arg in ["--keep-test-db", "--keep-test-db=false", "--remove-template=no"] {
        let out = fx.run(&[arg, "write-config"]);
        assert!(out.status.success(), "{} rejected: {}", arg, stderr(&out));
    }
    let out = fx.run(&["--keep-test-db=maybe", "write-config"]);
    assert!(!out.status.success());
}
