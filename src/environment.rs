use crate::app_config::{app_env, render_dotenv, DSN_VAR};
use crate::config::HarnessConfig;
use crate::db::{Admin, ConnectionParams};
use crate::logging::Logger;
use crate::script::{Invocation, Launcher, ScriptArgs, ScriptRunner};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

/// Database name used for scenarios that run against a missing database.
pub const UNKNOWN_DATABASE: &str = "UNKNOWN_DATABASE_NAME";

/// Tables holding bulky external data, emptied in the template so that
/// indexing stays fast.
const EXTERNAL_DATA_TABLES: &[&str] = &["gb_postcode", "us_postcode"];

/// Import steps run against an empty OSM file to create the full schema.
const IMPORT_STEPS: &[&str] = &[
    "import-data",
    "ignore-errors",
    "create-functions",
    "create-tables",
    "create-partition-tables",
    "create-partition-functions",
    "load-data",
    "create-search-indices",
];

const EMPTY_OSM: &[u8] = b"<osm version=\"0.6\"></osm>";

/// Drives the application's setup scripts and the test databases for a
/// sequence of scenarios.
///
/// The template database is built at most once per environment. Each fresh
/// scenario database is a copy of it.
pub struct TestEnvironment<'a, A: Admin, R: ScriptRunner> {
    log: &'a Logger,
    config: HarnessConfig,
    conn: ConnectionParams,
    launcher: Launcher,
    admin: A,
    runner: R,
    child_env: Option<BTreeMap<String, String>>,
    website_dir: Option<TempDir>,
    template_ready: bool,
    coverage_id: u32,
}

impl<'a, A: Admin, R: ScriptRunner> TestEnvironment<'a, A, R> {
    pub fn new(
        log: &'a Logger,
        config: HarnessConfig,
        admin: A,
        runner: R,
    ) -> Result<Self, String> {
        let launcher = Launcher::new(&config.script_command, &config.script_extension)?;
        Ok(Self {
            log,
            conn: config.connection(),
            config,
            launcher,
            admin,
            runner,
            child_env: None,
            website_dir: None,
            template_ready: false,
            coverage_id: 1,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Variables added to the environment of every script, empty until a
    /// configuration has been written.
    pub fn child_env(&self) -> BTreeMap<String, String> {
        self.child_env.clone().unwrap_or_default()
    }

    pub fn website_dir(&self) -> Option<&Path> {
        self.website_dir.as_ref().map(|d| d.path())
    }

    /// Points the application at `dbname` and prepares a fresh website
    /// directory for it. Nothing happens if the current configuration
    /// already uses the same connection string.
    pub fn write_config(&mut self, dbname: &str) -> Result<(), String> {
        let dsn = self.conn.dsn(dbname);
        let unchanged = self
            .child_env
            .as_ref()
            .and_then(|env| env.get(DSN_VAR))
            .is_some_and(|current| *current == dsn);
        if self.website_dir.is_some() && unchanged {
            self.log.debug("application config unchanged", &[("database", dbname)]);
            return Ok(());
        }

        let env = app_env(&dsn, self.config.server_module_path.as_deref());
        self.website_dir = None;
        let dir = tempfile::Builder::new()
            .prefix("geofixture-website-")
            .tempdir()
            .map_err(|e| format!("creating website directory: {}", e))?;
        let dotenv = dir.path().join(".env");
        std::fs::write(&dotenv, render_dotenv(&env))
            .map_err(|e| format!("writing {:?}: {}", dotenv, e))?;

        self.log.info(
            "wrote application config",
            &[
                ("database", dbname),
                ("dsn", &dsn),
                ("website_dir", &dir.path().to_string_lossy()),
            ],
        );
        self.child_env = Some(env);
        self.website_dir = Some(dir);

        let result = self.run_setup_script(&ScriptArgs::new().flag("setup-website"));
        if result.is_err() {
            self.website_dir = None;
        }
        result
    }

    pub fn run_setup_script(&mut self, args: &ScriptArgs) -> Result<(), String> {
        self.run_script("setup", args)
    }

    pub fn run_update_script(&mut self, args: &ScriptArgs) -> Result<(), String> {
        self.run_script("update", args)
    }

    fn run_script(&mut self, script: &str, args: &ScriptArgs) -> Result<(), String> {
        let argv = self
            .launcher
            .command_line(&self.config.build_dir, script, args)?;
        let cwd = match &self.website_dir {
            Some(dir) => dir.path().to_path_buf(),
            None => self.config.build_dir.clone(),
        };
        let invocation = Invocation {
            argv,
            cwd,
            env: self.child_env(),
        };
        self.runner
            .run(&invocation)
            .map_err(|e| format!("{} script failed: {}", script, e))
    }

    pub fn drop_database(&mut self, name: &str) -> Result<(), String> {
        self.log.info("dropping database", &[("database", name)]);
        self.admin.drop_database(name)
    }

    /// Makes sure the template database exists, building it when needed.
    ///
    /// With template reuse enabled an existing template is taken as is, even
    /// if its data is stale. Otherwise it is always rebuilt. A failed build
    /// leaves no template behind.
    pub fn setup_template_db(&mut self) -> Result<(), String> {
        if self.template_ready {
            return Ok(());
        }
        let template = self.config.template_db.clone();

        if self.config.reuse_template() {
            if self.admin.database_exists(&template)? {
                self.log.info("reusing existing template database", &[("database", &template)]);
                self.template_ready = true;
                return Ok(());
            }
        } else {
            self.drop_database(&template)?;
        }

        self.log.info("building template database", &[("database", &template)]);
        if let Err(e) = self.build_template(&template) {
            self.log.error(
                "template database setup failed",
                &[("database", &template), ("error", &e)],
            );
            if let Err(drop_err) = self.admin.drop_database(&template) {
                self.log.warn(
                    "could not remove partial template database",
                    &[("database", &template), ("error", &drop_err)],
                );
            }
            return Err(e);
        }

        self.template_ready = true;
        self.log.info("template database ready", &[("database", &template)]);
        Ok(())
    }

    fn build_template(&mut self, template: &str) -> Result<(), String> {
        self.write_config(template)?;
        self.run_setup_script(&ScriptArgs::new().flags(&["create-db", "setup-db"]))?;

        for table in self.admin.truncate_tables(template, EXTERNAL_DATA_TABLES)? {
            self.log.info("truncated external data", &[("table", &table)]);
        }

        let osm_file = empty_osm_file()?;
        let osm_path = osm_file.path().to_string_lossy().into_owned();
        self.run_setup_script(
            &ScriptArgs::new()
                .flags(IMPORT_STEPS)
                .option("osm_file", osm_path)
                .option("osm2pgsql_cache", 200),
        )
    }

    pub fn setup_api_db(&mut self) -> Result<(), String> {
        let db = self.config.api_test_db.clone();
        self.write_config(&db)
    }

    pub fn setup_unknown_db(&mut self) -> Result<(), String> {
        self.write_config(UNKNOWN_DATABASE)
    }

    /// Creates a fresh scenario database from the template and connects to it.
    /// If the connection fails, the new database is torn down again.
    pub fn setup_db(&mut self) -> Result<A::Session, String> {
        self.setup_template_db()?;
        let test_db = self.config.test_db.clone();
        let template = self.config.template_db.clone();
        self.write_config(&test_db)?;
        self.admin.drop_database(&test_db)?;
        self.admin.create_from_template(&test_db, &template)?;
        self.log.info(
            "created scenario database",
            &[("database", &test_db), ("template", &template)],
        );
        match self.admin.open(&test_db) {
            Ok(session) => Ok(session),
            Err(e) => {
                if let Err(teardown_err) = self.teardown_db(None) {
                    self.log.warn(
                        "could not remove scenario database",
                        &[("database", &test_db), ("error", &teardown_err)],
                    );
                }
                Err(e)
            }
        }
    }

    /// Closes the scenario connection and removes the scenario database
    /// unless it is configured to be kept.
    pub fn teardown_db(&mut self, session: Option<A::Session>) -> Result<(), String> {
        drop(session);
        let test_db = self.config.test_db.clone();
        if self.config.keep_test_db {
            self.log.info("keeping scenario database", &[("database", &test_db)]);
            return Ok(());
        }
        self.drop_database(&test_db)
    }

    /// Next file name for a coverage dump, or `None` when coverage is off.
    pub fn next_code_coverage_file(&mut self) -> Option<PathBuf> {
        let dir = self.config.coverage_dir.as_ref()?;
        let file = dir.join(format!("{:06}.cov", self.coverage_id));
        self.coverage_id += 1;
        Some(std::path::absolute(&file).unwrap_or(file))
    }
}

fn empty_osm_file() -> Result<NamedTempFile, String> {
    let mut file = tempfile::Builder::new()
        .prefix("geofixture-")
        .suffix(".xml")
        .tempfile()
        .map_err(|e| format!("creating empty OSM file: {}", e))?;
    file.write_all(EMPTY_OSM)
        .and_then(|_| file.flush())
        .map_err(|e| format!("writing empty OSM file: {}", e))?;
    Ok(file)
}
