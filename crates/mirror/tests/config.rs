//! Configuration loading from disk

use anyhow::Result;
use margin_mirror::margin_layout::I80F48;
use margin_mirror::{HealthType, IdlePolicy, MirrorConfig, MirrorError};
use std::fs;
use tempfile::TempDir;

fn config_content() -> &'static str {
    r#"
[sync]
staleness_tolerance_slots = 1
coalescing_window_ms = 20
idle_policy = { mode = "never" }
change_buffer = 256

[transport]
reconnect_delay_ms = 250
max_reconnect_attempts = 4
command_buffer = 64

[risk]
health_type = "maintenance"
liquidation_threshold = "0.75"

[logging]
level = "debug"
json = true
"#
}

#[test]
fn test_config_loading_from_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("mirror.toml");
    fs::write(&config_path, config_content())?;

    let config = MirrorConfig::from_file(&config_path)?;

    assert_eq!(config.sync.staleness_tolerance_slots, 1);
    assert_eq!(config.sync.coalescing_window_ms, 20);
    assert_eq!(config.sync.idle_policy, IdlePolicy::Never);
    assert_eq!(config.sync.change_buffer, 256);
    assert_eq!(config.transport.reconnect_delay_ms, 250);
    assert_eq!(config.transport.max_reconnect_attempts, 4);
    assert_eq!(config.risk.health_type, HealthType::Maintenance);
    assert_eq!(config.risk.liquidation_threshold, I80F48::from_num(0.75));
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
    Ok(())
}

#[test]
fn test_empty_file_uses_defaults() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("empty.toml");
    fs::write(&config_path, "")?;

    let config = MirrorConfig::from_file(&config_path)?;
    assert_eq!(config.sync.staleness_tolerance_slots, 0);
    assert_eq!(config.sync.idle_policy, IdlePolicy::Immediate);
    Ok(())
}

#[test]
fn test_missing_file() {
    let err = MirrorConfig::from_file("/nonexistent/mirror.toml").unwrap_err();
    assert!(matches!(err, MirrorError::Configuration(_)));
}

#[test]
fn test_invalid_values_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let cases = [
        "[sync]\nchange_buffer = 1\n",
        "[sync]\nidle_policy = { mode = \"after_idle\", secs = 0 }\n",
        "[sync]\nidle_policy = { mode = \"sometimes\" }\n",
        "[logging]\nlevel = \"chatty\"\n",
        "[risk]\nliquidation_threshold = \"-1\"\n",
    ];
    for (i, content) in cases.iter().enumerate() {
        let path = temp_dir.path().join(format!("bad-{}.toml", i));
        fs::write(&path, content)?;
        assert!(
            matches!(MirrorConfig::from_file(&path), Err(MirrorError::Configuration(_))),
            "accepted {:?}",
            content
        );
    }
    Ok(())
}
