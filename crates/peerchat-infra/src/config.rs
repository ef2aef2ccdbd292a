//! Session configuration loader for peerchat.
//!
//! Reads `config.toml` from the data directory (`~/.peerchat/` in production)
//! and deserializes it into [`SessionConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use peerchat_types::config::SessionConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PEERCHAT_DATA_DIR";

/// Load session configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`SessionConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and
///   returns the default.
pub async fn load_session_config(data_dir: &Path) -> SessionConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return SessionConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return SessionConfig::default();
        }
    };

    match toml::from_str::<SessionConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            SessionConfig::default()
        }
    }
}

/// Resolve the data directory.
///
/// Priority:
/// 1. `PEERCHAT_DATA_DIR` environment variable
/// 2. `~/.peerchat`
/// 3. `.peerchat` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    resolve_data_dir_from(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
}

fn resolve_data_dir_from(env_override: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = env_override.filter(|d| !d.as_os_str().is_empty()) {
        return dir;
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".peerchat");
    }
    PathBuf::from(".peerchat")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_session_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_session_config(tmp.path()).await;
        assert_eq!(config, SessionConfig::default());
    }

    #[tokio::test]
    async fn load_session_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
free_text_limit = 80
free_image_quota = 1

[timing]
reply_ms = 1200
"#,
        )
        .await
        .unwrap();

        let config = load_session_config(tmp.path()).await;
        assert_eq!(config.free_text_limit, 80);
        assert_eq!(config.free_image_quota, 1);
        assert_eq!(config.free_voice_quota, 3);
        assert_eq!(config.timing.reply_ms, 1_200);
        assert_eq!(config.timing.sent_ms, 500);
    }

    #[tokio::test]
    async fn load_session_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_session_config(tmp.path()).await;
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn resolve_data_dir_prefers_override() {
        let dir = resolve_data_dir_from(Some(PathBuf::from("/srv/peerchat")));
        assert_eq!(dir, PathBuf::from("/srv/peerchat"));
    }

    #[test]
    fn resolve_data_dir_ignores_empty_override() {
        let dir = resolve_data_dir_from(Some(PathBuf::new()));
        assert!(dir.ends_with(".peerchat"));
    }
}
