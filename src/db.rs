/// Connection settings shared by every database the harness touches. Unset
/// fields fall back to the libpq-style defaults of the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: Option<String>,
    pub port: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Database used for DROP/CREATE DATABASE, which cannot run against the
/// database being dropped or created.
pub const MAINTENANCE_DB: &str = "postgres";

impl ConnectionParams {
    /// Connection string in the format the external application expects.
    /// Only configured fields are included.
    pub fn dsn(&self, dbname: &str) -> String {
        let mut dsn = format!("pgsql:dbname={}", dbname);
        for (key, value) in [
            ("host", &self.host),
            ("port", &self.port),
            ("user", &self.user),
            ("password", &self.password),
        ] {
            if let Some(v) = value {
                dsn.push_str(&format!(";{}={}", key, v));
            }
        }
        dsn
    }

    pub fn pg_config(&self, dbname: &str) -> Result<postgres::Config, String> {
        let mut config = postgres::Config::new();
        config.dbname(dbname);

        match self.host.clone().or_else(|| env_nonempty("PGHOST")) {
            Some(host) => {
                config.host(&host);
            }
            None => default_host(&mut config),
        }
        if let Some(port) = self.port.clone().or_else(|| env_nonempty("PGPORT")) {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid database port {:?}", port))?;
            config.port(port);
        }
        if let Some(user) = self
            .user
            .clone()
            .or_else(|| env_nonempty("PGUSER"))
            .or_else(|| env_nonempty("USER"))
        {
            config.user(&user);
        }
        if let Some(password) = self.password.clone().or_else(|| env_nonempty("PGPASSWORD")) {
            config.password(password);
        }
        Ok(config)
    }

    pub fn connect(&self, dbname: &str) -> Result<postgres::Client, String> {
        self.pg_config(dbname)?
            .connect(postgres::NoTls)
            .map_err(|e| format!("connecting to database '{}': {}", dbname, e))
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(unix)]
fn default_host(config: &mut postgres::Config) {
    config.host_path("/var/run/postgresql");
}

#[cfg(not(unix))]
fn default_host(config: &mut postgres::Config) {
    config.host("localhost");
}

/// Quotes a name for use as an SQL identifier. Embedded double quotes are
/// doubled, so any string is safe to splice into DDL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Administrative operations on the database server.
pub trait Admin {
    /// Connection handed to a scenario for the lifetime of its test database.
    type Session;

    fn database_exists(&mut self, name: &str) -> Result<bool, String>;
    /// Dropping a database that does not exist is not an error.
    fn drop_database(&mut self, name: &str) -> Result<(), String>;
    fn create_from_template(&mut self, name: &str, template: &str) -> Result<(), String>;
    /// Truncates those of `candidates` that exist in `dbname` and returns them.
    fn truncate_tables(&mut self, dbname: &str, candidates: &[&str])
        -> Result<Vec<String>, String>;
    fn open(&mut self, dbname: &str) -> Result<Self::Session, String>;
}

pub struct PostgresAdmin {
    params: ConnectionParams,
}

impl PostgresAdmin {
    pub fn new(params: ConnectionParams) -> Self {
        Self { params }
    }

    fn maintenance(&self) -> Result<postgres::Client, String> {
        self.params.connect(MAINTENANCE_DB)
    }
}

impl Admin for PostgresAdmin {
    type Session = postgres::Client;

    fn database_exists(&mut self, name: &str) -> Result<bool, String> {
        let mut client = self.maintenance()?;
        let row = client
            .query_one(
                "SELECT count(*) FROM pg_database WHERE datname = $1",
                &[&name],
            )
            .map_err(|e| format!("looking up database '{}': {}", name, e))?;
        let count: i64 = row.get(0);
        Ok(count == 1)
    }

    fn drop_database(&mut self, name: &str) -> Result<(), String> {
        let mut client = self.maintenance()?;
        client
            .batch_execute(&format!("DROP DATABASE IF EXISTS {}", quote_identifier(name)))
            .map_err(|e| format!("dropping database '{}': {}", name, e))
    }

    fn create_from_template(&mut self, name: &str, template: &str) -> Result<(), String> {
        let mut client = self.maintenance()?;
        client
            .batch_execute(&format!(
                "CREATE DATABASE {} TEMPLATE = {}",
                quote_identifier(name),
                quote_identifier(template)
            ))
            .map_err(|e| {
                format!(
                    "creating database '{}' from template '{}': {}",
                    name, template, e
                )
            })
    }

    fn truncate_tables(
        &mut self,
        dbname: &str,
        candidates: &[&str],
    ) -> Result<Vec<String>, String> {
        let mut client = self.params.connect(dbname)?;
        let names: Vec<String> = candidates.iter().map(|s| s.to_string()).collect();
        let rows = client
            .query(
                "SELECT tablename::text FROM pg_tables WHERE tablename = ANY($1) ORDER BY tablename",
                &[&names],
            )
            .map_err(|e| format!("listing tables in '{}': {}", dbname, e))?;
        let present: Vec<String> = rows.iter().map(|r| r.get(0)).collect();

        let mut tx = client
            .transaction()
            .map_err(|e| format!("beginning transaction: {}", e))?;
        for table in &present {
            tx.batch_execute(&format!("TRUNCATE TABLE {}", quote_identifier(table)))
                .map_err(|e| format!("truncating table '{}': {}", table, e))?;
        }
        tx.commit()
            .map_err(|e| format!("committing transaction: {}", e))?;
        Ok(present)
    }

    fn open(&mut self, dbname: &str) -> Result<postgres::Client, String> {
        self.params.connect(dbname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("test_db"), "\"test_db\"");
        assert_eq!(quote_identifier("Mixed Case"), "\"Mixed Case\"");
        assert_eq!(quote_identifier("bad\"; DROP"), "\"bad\"\"; DROP\"");
    }

    #[test]
    fn test_dsn_only_database() {
        let params = ConnectionParams::default();
        assert_eq!(params.dsn("test_nominatim"), "pgsql:dbname=test_nominatim");
    }

    #[test]
    fn test_dsn_all_fields_in_order() {
        let params = ConnectionParams {
            host: Some("db".into()),
            port: Some("5433".into()),
            user: Some("u".into()),
            password: Some("p".into()),
        };
        assert_eq!(
            params.dsn("x"),
            "pgsql:dbname=x;host=db;port=5433;user=u;password=p"
        );
    }

    #[test]
    fn test_dsn_omits_unset_fields() {
        let params = ConnectionParams {
            host: None,
            port: Some("5432".into()),
            user: None,
            password: Some("secret".into()),
        };
        let dsn = params.dsn("x");
        assert_eq!(dsn, "pgsql:dbname=x;port=5432;password=secret");
        assert!(!dsn.contains("host="));
        assert!(!dsn.contains("user="));
    }

    #[test]
    fn test_pg_config_uses_configured_fields() {
        let params = ConnectionParams {
            host: Some("db.example".into()),
            port: Some("6543".into()),
            user: Some("alice".into()),
            password: Some("pw".into()),
        };
        let config = params.pg_config("mydb").unwrap();
        assert_eq!(config.get_dbname(), Some("mydb"));
        assert_eq!(config.get_ports(), &[6543]);
        assert_eq!(config.get_user(), Some("alice"));
        assert_eq!(config.get_password(), Some(&b"pw"[..]));
    }

    #[test]
    fn test_pg_config_rejects_bad_port() {
        let params = ConnectionParams {
            port: Some("nope".into()),
            ..Default::default()
        };
        assert!(params.pg_config("x").is_err());
    }
}
