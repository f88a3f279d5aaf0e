use crate::error::ConfigError;
use core_types::BotConfig;
use std::path::Path;

/// Loads the `bots.toml` registry used when no `DATABASE_URL` is configured.
/// The file holds a `[[bots]]` array of `BotConfig` records (spec §6).
pub fn load_bots_file(path: &str) -> Result<Vec<BotConfig>, ConfigError> {
    if !Path::new(path).exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::BotsFile(format!("reading {path}: {e}")))?;

    #[derive(serde::Deserialize)]
    struct BotsFile {
        #[serde(default)]
        bots: Vec<BotConfig>,
    }

    let parsed: BotsFile =
        toml::from_str(&raw).map_err(|e| ConfigError::BotsFile(format!("parsing {path}: {e}")))?;
    Ok(parsed.bots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_returns_empty_vec() {
        let bots = load_bots_file("/nonexistent/path/bots.toml").unwrap();
        assert!(bots.is_empty());
    }

    #[test]
    fn parses_a_valid_bots_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bots.toml");
        std::fs::write(
            &path,
            r#"
            [[bots]]
            bot_id = "9f8b8e6a-3f1f-4f7a-9c2a-6f1a2b3c4d5e"
            name = "alpha"
            symbol = "BTCUSDT"
            strategy = "technical"
            strategy_params = {}
            allocated = "100"
            state = "stopped"
            has_traded = false
            orphan_adopted = false
            created_at = "2026-01-01T00:00:00Z"
            updated_at = "2026-01-01T00:00:00Z"
            "#,
        )
        .unwrap();

        let bots = load_bots_file(path.to_str().unwrap()).unwrap();
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].name, "alpha");
        assert_eq!(bots[0].symbol, "BTCUSDT");
    }

    #[test]
    fn malformed_toml_is_a_bots_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bots.toml");
        std::fs::write(&path, "not valid toml [[[").unwrap();

        let err = load_bots_file(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::BotsFile(_)));
    }

    #[test]
    fn missing_bots_key_defaults_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bots.toml");
        std::fs::write(&path, "").unwrap();

        let bots = load_bots_file(path.to_str().unwrap()).unwrap();
        assert!(bots.is_empty());
    }
}
