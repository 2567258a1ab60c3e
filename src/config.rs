//! Gateway configuration loaded from a YAML file.
//!
//! The configuration carries the command allow-list; everything else
//! (port, log level, file paths) comes from the command line or the
//! environment.

use std::path::Path;

use serde::Deserialize;

use crate::error::GatewayError;

/// Top-level YAML configuration document.
///
/// ```yaml
/// allowed_aos_commands:
///   - "show "
///   - "ping \\S+"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfig {
    /// Ordered regex allow-list for commands. Each pattern is matched from
    /// the start of the command string. An empty list denies everything.
    #[serde(default)]
    pub allowed_aos_commands: Vec<String>,
}

impl GatewayConfig {
    /// Loads and parses the YAML configuration file.
    pub fn load(path: &Path) -> Result<GatewayConfig, GatewayError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&raw)
            .map_err(|e| GatewayError::Config(format!("invalid YAML in {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::GatewayConfig;

    #[test]
    fn parses_allow_list() {
        let cfg: GatewayConfig =
            serde_yaml::from_str("allowed_aos_commands:\n  - \"show \"\n  - \"ping\"\n")
                .expect("parse config");
        assert_eq!(cfg.allowed_aos_commands, vec!["show ", "ping"]);
    }

    #[test]
    fn missing_key_defaults_to_empty_list() {
        let cfg: GatewayConfig = serde_yaml::from_str("other_key: 1\n").expect("parse config");
        assert!(cfg.allowed_aos_commands.is_empty());
    }

    #[test]
    fn load_rejects_missing_file() {
        let err = GatewayConfig::load(std::path::Path::new("/nonexistent/conf.yaml"))
            .expect_err("missing file must fail");
        assert!(err.to_string().contains("configuration error"));
    }
}
