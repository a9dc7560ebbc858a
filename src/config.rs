// Конфигурация кондуктора.
// Логирование по умолчанию подробнее в режиме отладки.

use crate::error::ConfigError;
use crate::peer::types::ServerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(debug_assertions)]
pub const DEFAULT_LOG_FILTER: &str = "debug";

#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Период опроса статистики по умолчанию
pub const DEFAULT_STATS_INTERVAL_MS: u64 = 1000;

/// Размер пула ICE кандидатов
pub const DEFAULT_ICE_CANDIDATE_POOL_SIZE: u8 = 10;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ConductorConfig {
    pub stats_interval_ms: u64,
    pub ice_servers: Vec<ServerConfig>,
    pub ice_candidate_pool_size: u8,
    /// Автоматически звонить первому появившемуся пиру (headless режим)
    pub autocall: bool,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            stats_interval_ms: DEFAULT_STATS_INTERVAL_MS,
            ice_servers: default_ice_servers(),
            ice_candidate_pool_size: DEFAULT_ICE_CANDIDATE_POOL_SIZE,
            autocall: false,
        }
    }
}

impl ConductorConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stats_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "stats_interval_ms must be greater than zero".into(),
            ));
        }

        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "server {} has an empty url",
                    server.id
                )));
            }

            if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none())
            {
                return Err(ConfigError::Invalid(format!(
                    "TURN server {} requires username and credential",
                    server.id
                )));
            }
        }
        Ok(())
    }
}

/// Дефолтные STUN серверы Google
pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
}

/// Добавляет схему протокола к URL ICE сервера, если она отсутствует
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    if config.url.starts_with("turn:") || config.url.starts_with("stun:") {
        config.url.clone()
    } else {
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}
