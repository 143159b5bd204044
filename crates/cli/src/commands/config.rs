use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value as JsonValue};
use toml::Value;

use crate::commands::{load_config, CommandResult};

/// Keys reported with their source, paired with the env variable that overrides each.
const SOURCED_KEYS: &[(&str, &str)] = &[
    ("database.url", "FORCAGE_DATABASE_URL"),
    ("database.max_connections", "FORCAGE_DATABASE_MAX_CONNECTIONS"),
    ("database.timeout_secs", "FORCAGE_DATABASE_TIMEOUT_SECS"),
    ("server.bind_address", "FORCAGE_SERVER_BIND_ADDRESS"),
    ("server.port", "FORCAGE_SERVER_PORT"),
    ("server.graceful_shutdown_secs", "FORCAGE_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ("server.api_token", "FORCAGE_SERVER_API_TOKEN"),
    ("lifecycle.due_days", "FORCAGE_LIFECYCLE_DUE_DAYS"),
    ("lifecycle.motive_min_chars", "FORCAGE_LIFECYCLE_MOTIVE_MIN_CHARS"),
    ("lifecycle.motive_max_chars", "FORCAGE_LIFECYCLE_MOTIVE_MAX_CHARS"),
    ("logging.level", "FORCAGE_LOGGING_LEVEL"),
    ("logging.format", "FORCAGE_LOGGING_FORMAT"),
];

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut sources = Map::new();
    for (key_path, env_key) in SOURCED_KEYS {
        let source = field_source(
            key_path,
            env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        sources.insert((*key_path).to_string(), JsonValue::String(source));
    }

    CommandResult::success_with(
        "config",
        "effective config (source precedence: env > file > default)",
        Some(serde_json::json!({
            "effective": config.redacted(),
            "sources": sources,
        })),
    )
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("forcage.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/forcage.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
