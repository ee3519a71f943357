use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use ledger_auth::ClientConfig;

/// Client settings from the environment, falling back to `.env.local` / `.env`.
pub fn client_config() -> anyhow::Result<ClientConfig> {
    ClientConfig::from_lookup(lookup).context("Invalid ledger configuration")
}

fn lookup(key: &str) -> Option<String> {
    if let Ok(val) = std::env::var(key) {
        if !val.is_empty() {
            return Some(val);
        }
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    for filename in [".env.local", ".env"] {
        if let Ok(content) = fs::read_to_string(cwd.join(filename)) {
            if let Some(val) = parse_env_value(&content, key) {
                return Some(val);
            }
        }
    }
    None
}

fn parse_env_value(content: &str, key: &str) -> Option<String> {
    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        if k.trim() != key {
            continue;
        }
        let v = v.trim();
        let unquoted = if v.len() >= 2
            && ((v.starts_with('"') && v.ends_with('"'))
                || (v.starts_with('\'') && v.ends_with('\'')))
        {
            v[1..v.len() - 1].trim()
        } else {
            v
        };
        if !unquoted.is_empty() {
            return Some(unquoted.to_string());
        }
    }
    None
}
