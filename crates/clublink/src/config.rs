//! Loading [`SessionConfig`] from JSON files.

use std::path::Path;

use clublink_session::SessionConfig;

use crate::ClubError;

/// Reads a session config from a JSON file. Missing fields take their
/// defaults; durations are written in milliseconds.
///
/// ```json
/// {
///   "auth_addr": "203.0.113.7:8600",
///   "lobby_host": "203.0.113.7",
///   "account": "bot01",
///   "password_hash": "e10adc3949ba59abbe56e057f20f883e",
///   "house_id": 20001,
///   "restart_interval": 5000
/// }
/// ```
///
/// # Errors
/// [`ClubError::Config`] if the file cannot be read and
/// [`ClubError::ConfigFormat`] if it is not a valid config.
pub fn load_file(path: impl AsRef<Path>) -> Result<SessionConfig, ClubError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ClubError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    let config = from_json(&text).map_err(|source| ClubError::ConfigFormat {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), house_id = %config.house_id, "config loaded");
    Ok(config)
}

fn from_json(text: &str) -> Result<SessionConfig, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clublink_protocol::HouseId;

    use super::*;

    #[test]
    fn test_from_json_fills_defaults() {
        let text = r#"{ "account": "bot01", "house_id": 20001, "restart_interval": 2500 }"#;
        let config = from_json(text).unwrap();
        assert_eq!(config.account, "bot01");
        assert_eq!(config.house_id, HouseId(20_001));
        assert_eq!(config.restart_interval, Duration::from_millis(2500));
        assert_eq!(
            config.max_restart_attempts,
            SessionConfig::default().max_restart_attempts
        );
    }

    #[test]
    fn test_load_file_missing_is_config_error() {
        let err = load_file("/nonexistent/clublink.json").unwrap_err();
        assert!(matches!(err, ClubError::Config { .. }));
    }

    #[test]
    fn test_load_file_bad_json_is_format_error() {
        let path = std::env::temp_dir().join(format!("clublink-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_file(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, ClubError::ConfigFormat { .. }));
    }
}
