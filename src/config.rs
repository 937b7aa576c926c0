//! Environment-driven configuration.
//!
//! Grounded in `main.rs`'s `load_env`/`resolve_data_path` idiom: dotenv
//! search rooted at the crate's own manifest directory (so running the
//! server from an unrelated working directory doesn't silently create a
//! database next to wherever the shell happened to be), and relative
//! path arguments resolved against that same directory rather than cwd.

use dotenv::dotenv;
use std::env;
use std::path::{Path, PathBuf};

fn manifest_dir() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR"))
}

fn default_data_path(filename: &str) -> String {
    manifest_dir().join(filename).to_string_lossy().to_string()
}

fn resolve_data_path(env_value: Option<String>, default_filename: &str) -> String {
    let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) else {
        return default_data_path(default_filename);
    };
    let p = PathBuf::from(raw);
    if p.is_absolute() {
        return p.to_string_lossy().to_string();
    }
    manifest_dir().join(p).to_string_lossy().to_string()
}

/// Load `.env` from the working directory, its parents, and (as a
/// fallback) the crate's own manifest directory and its parent.
pub fn load_env() {
    let _ = dotenv();
    let candidates = [manifest_dir().join(".env"), manifest_dir().join("../.env")];
    for p in candidates {
        if p.exists() {
            let _ = dotenv::from_path(&p);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub bind_addr: String,
    pub server_hmac_secret: Vec<u8>,
    pub signing_key: Option<[u8; 32]>,
    pub trusted_key_versions: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let database_path =
            resolve_data_path(env::var("DATABASE_PATH").or_else(|_| env::var("DB_PATH")).ok(), "trackrecord.db");

        let bind_addr = env::var("BIND_ADDR")
            .ok()
            .or_else(|| env::var("PORT").ok().map(|p| format!("0.0.0.0:{p}")))
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let server_hmac_secret = env::var("SERVER_HMAC_SECRET")
            .unwrap_or_else(|_| "dev-hmac-secret-change-in-production".to_string())
            .into_bytes();

        let signing_key = env::var("SIGNING_KEY_HEX").ok().and_then(|hex_str| {
            let bytes = hex::decode(hex_str).ok()?;
            bytes.try_into().ok()
        });

        let trusted_key_versions = env::var("TRUSTED_KEY_VERSIONS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        Config { database_path, bind_addr, server_hmac_secret, signing_key, trusted_key_versions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bind_addr_is_set_without_env() {
        env::remove_var("BIND_ADDR");
        env::remove_var("PORT");
        let config = Config::from_env();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }
}
