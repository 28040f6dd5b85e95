use std::collections::BTreeMap;

pub const DSN_VAR: &str = "NOMINATIM_DATABASE_DSN";
pub const FLATNODE_VAR: &str = "NOMINATIM_FLATNODE_FILE";
pub const IMPORT_STYLE_VAR: &str = "NOMINATIM_IMPORT_STYLE";
pub const TIGER_DATA_VAR: &str = "NOMINATIM_USE_US_TIGER_DATA";
pub const MODULE_PATH_VAR: &str = "NOMINATIM_DATABASE_MODULE_PATH";

/// Variables the application's scripts read to find their database.
/// Flat-node storage is disabled, the full import style is selected and the
/// US TIGER extension is switched on.
pub fn app_env(dsn: &str, server_module_path: Option<&str>) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(DSN_VAR.to_string(), dsn.to_string());
    env.insert(FLATNODE_VAR.to_string(), String::new());
    env.insert(IMPORT_STYLE_VAR.to_string(), "full".to_string());
    env.insert(TIGER_DATA_VAR.to_string(), "yes".to_string());
    if let Some(path) = server_module_path {
        env.insert(MODULE_PATH_VAR.to_string(), path.to_string());
    }
    env
}

/// Renders variables as a dotenv file, one `KEY=value` per line.
pub fn render_dotenv(env: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (k, v) in env {
        out.push_str(k);
        out.push('=');
        out.push_str(&dotenv_value(v));
        out.push('\n');
    }
    out
}

fn dotenv_value(v: &str) -> String {
    let needs_quotes = v
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '#' | '\\' | '$'));
    if !needs_quotes {
        return v.to_string();
    }
    let mut quoted = String::with_capacity(v.len() + 2);
    quoted.push('"');
    for c in v.chars() {
        match c {
            '"' | '\\' | '$' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
