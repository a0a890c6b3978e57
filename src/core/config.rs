use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::AppCore;

const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct AppConfig {
    pub(super) send_timeout_secs: Option<u64>,
    // Kill-switch for outbound typing events (inbound ones still apply).
    pub(super) typing_events: Option<bool>,
}

pub(super) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join("parley_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_default()
}

impl AppCore {
    pub(super) fn send_timeout(&self) -> Duration {
        Duration::from_secs(
            self.config
                .send_timeout_secs
                .unwrap_or(DEFAULT_SEND_TIMEOUT_SECS),
        )
    }

    pub(super) fn typing_events_enabled(&self) -> bool {
        self.config.typing_events.unwrap_or(true)
    }
}
