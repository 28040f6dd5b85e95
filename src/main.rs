mod app_config;
mod cmd;
mod config;
mod db;
mod environment;
mod logging;
mod script;

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "geofixture",
    version,
    about = "Database and environment fixtures for geocoder BDD tests"
)]
#[command(
    long_about = "Geofixture prepares PostgreSQL databases for the behaviour-driven\ntest suite of a geocoder. It builds and caches a template database\nthrough the application's setup scripts, copies it into fresh\nscenario databases, writes the application's environment config\nand runs setup or update scripts with structured logging."
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_JSON",
        help = "Enable JSON log output"
    )]
    json: bool,

    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_LOG_LEVEL",
        default_value = "info",
        help = "Minimum log level (debug, info, warn, error)"
    )]
    log_level: logging::Level,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Settings {
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_CONFIG",
        help = "Harness config file (YAML, or JSON with a .json extension)"
    )]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_BUILD_DIR",
        help = "Application build directory containing utils/"
    )]
    build_dir: Option<PathBuf>,
    #[arg(long, global = true, env = "GEOFIXTURE_DB_HOST", help = "Database host")]
    db_host: Option<String>,
    #[arg(long, global = true, env = "GEOFIXTURE_DB_PORT", help = "Database port")]
    db_port: Option<String>,
    #[arg(long, global = true, env = "GEOFIXTURE_DB_USER", help = "Database user")]
    db_user: Option<String>,
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_DB_PASS",
        hide_env_values = true,
        help = "Database password"
    )]
    db_pass: Option<String>,
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_TEMPLATE_DB",
        help = "Name of the cached template database"
    )]
    template_db: Option<String>,
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_TEST_DB",
        help = "Name of the per-scenario database"
    )]
    test_db: Option<String>,
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_API_TEST_DB",
        help = "Name of the prebuilt API test database"
    )]
    api_test_db: Option<String>,
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_SERVER_MODULE_PATH",
        help = "Path of the database server module"
    )]
    server_module_path: Option<String>,
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_REMOVE_TEMPLATE",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        help = "Always rebuild the template database (--remove-template=false to reuse it)"
    )]
    remove_template: Option<bool>,
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_KEEP_TEST_DB",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        help = "Keep the scenario database after teardown (--keep-test-db=false to drop it)"
    )]
    keep_test_db: Option<bool>,
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_COVERAGE_DIR",
        help = "Directory for code coverage dumps"
    )]
    coverage_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_SCRIPT_COMMAND",
        help = "Interpreter command line for utility scripts"
    )]
    script_command: Option<String>,
    #[arg(
        long,
        global = true,
        env = "GEOFIXTURE_SCRIPT_EXTENSION",
        help = "File extension of the utility scripts"
    )]
    script_extension: Option<String>,
}

impl Settings {
    fn resolve(self) -> Result<config::HarnessConfig, String> {
        let cfg = config::HarnessConfig::load(self.config.as_deref())?;
        cfg.apply_overrides(config::Overrides {
            build_dir: self.build_dir,
            db_host: self.db_host,
            db_port: self.db_port,
            db_user: self.db_user,
            db_pass: self.db_pass,
            template_db: self.template_db,
            test_db: self.test_db,
            api_test_db: self.api_test_db,
            server_module_path: self.server_module_path,
            remove_template: self.remove_template,
            keep_test_db: self.keep_test_db,
            coverage_dir: self.coverage_dir,
            script_command: self.script_command,
            script_extension: self.script_extension,
        })
    }
}

#[derive(Args)]
struct TargetArgs {
    #[arg(long, conflicts_with_all = ["api", "unknown"], help = "Database to configure")]
    db: Option<String>,
    #[arg(long, conflicts_with = "unknown", help = "Use the API test database")]
    api: bool,
    #[arg(long, help = "Use a database that does not exist")]
    unknown: bool,
}

impl TargetArgs {
    fn target(self) -> cmd::Target {
        cmd::Target::from_flags(self.db, self.api, self.unknown)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the template database, or reuse an existing one
    SetupTemplate,

    /// Create a fresh scenario database from the template
    SetupDb,

    /// Drop the scenario database unless it is kept
    TeardownDb,

    /// Drop a database if it exists
    DropDb {
        #[arg(long, required = true, help = "Database name")]
        name: String,
    },

    /// Write the application config and print it as dotenv
    WriteConfig {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Run the application's setup script
    RunSetup {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run the application's update script
    RunUpdate {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run a command against a fresh scenario database
    Scenario {
        #[arg(long, conflicts_with = "unknown", help = "Use the API test database")]
        api: bool,
        #[arg(long, help = "Use a database that does not exist")]
        unknown: bool,
        #[arg(
            long,
            default_value = "",
            env = "GEOFIXTURE_WORKDIR",
            help = "Working directory for the command"
        )]
        workdir: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let log = logging::Logger::stderr(cli.log_level);
    if cli.json {
        log.set_json(true);
    }

    let result = cli.settings.resolve().and_then(|cfg| match cli.command {
        Commands::SetupTemplate => cmd::database::setup_template(&log, cfg),
        Commands::SetupDb => cmd::database::setup_db(&log, cfg),
        Commands::TeardownDb => cmd::database::teardown_db(&log, cfg),
        Commands::DropDb { name } => cmd::database::drop_db(&log, cfg, &name),
        Commands::WriteConfig { target } => cmd::app_config::run(&log, cfg, &target.target()),
        Commands::RunSetup { target, args } => {
            cmd::script::run(&log, cfg, cmd::script::Script::Setup, &target.target(), &args)
        }
        Commands::RunUpdate { target, args } => {
            cmd::script::run(&log, cfg, cmd::script::Script::Update, &target.target(), &args)
        }
        Commands::Scenario {
            api,
            unknown,
            workdir,
            args,
        } => {
            let target = cmd::Target::from_flags(None, api, unknown);
            cmd::scenario::run(&log, cfg, &target, &workdir, &args)
        }
    });

    if let Err(e) = result {
        log.error(&e, &[]);
        std::process::exit(1);
    }
}
