/*
[INPUT]:  YAML configuration file, COINBASE_STREAM__* environment variables, .env
[OUTPUT]: Parsed tail configuration and the adapter settings derived from it
[POS]:    Configuration layer - stream setup
[UPDATE]: When adding new configuration options
*/

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use coinbase_stream_adapter::{
    ADVANCED_TRADE_WS_URL, Channel, ChannelName, ConnectOptions, HeartbeatConfig,
    ReconnectConfig, StreamConfig,
};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Prefix for environment overrides, e.g. `COINBASE_STREAM__URL`
pub const ENV_PREFIX: &str = "COINBASE_STREAM";

/// Top-level configuration for the stream tail
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TailConfig {
    /// WebSocket feed endpoint
    #[serde(default = "default_url")]
    pub url: String,
    /// REST base URL, only used for the server time endpoint
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    /// API credentials; public channels work without them
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,
    /// Channels subscribed once the first session opens
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Correct signing timestamps with the exchange clock
    #[serde(default)]
    pub sync_server_time: bool,
    /// Also log every decodable frame verbatim
    #[serde(default)]
    pub emit_raw_messages: bool,
}

/// API key pair used by the HMAC signer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialsConfig {
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
}

/// One subscription entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    pub name: ChannelName,
    #[serde(default)]
    pub product_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeartbeatSettings {
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,
    /// Treat any inbound frame as proof of life
    #[serde(default)]
    pub traffic_as_liveness: bool,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
            traffic_as_liveness: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// 0 retries forever
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
            max_attempts: 0,
        }
    }
}

fn default_url() -> String {
    ADVANCED_TRADE_WS_URL.to_string()
}

fn default_rest_url() -> String {
    "https://api.coinbase.com/api/v3/".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_ping_interval_ms() -> u64 {
    10_000
}

fn default_pong_timeout_ms() -> u64 {
    10_000
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.1
}

impl TailConfig {
    /// Load `path` (YAML) layered under `COINBASE_STREAM__*` variables.
    ///
    /// A `.env` file in the working directory is read first when present.
    pub fn load(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true);
        Self::build(File::from(path).format(FileFormat::Yaml), environment)
            .with_context(|| format!("load config from {}", path.display()))
    }

    /// Parse YAML text with an explicit environment layer
    pub fn from_yaml(yaml: &str, environment: Environment) -> Result<Self> {
        Self::build(File::from_str(yaml, FileFormat::Yaml), environment)
    }

    fn build<S>(file: S, environment: Environment) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config: Self = Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()
            .context("build configuration")?
            .try_deserialize()
            .context("deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.url.is_empty(), "url must not be empty");
        anyhow::ensure!(
            self.heartbeat.ping_interval_ms > 0 && self.heartbeat.pong_timeout_ms > 0,
            "heartbeat intervals must be positive"
        );
        anyhow::ensure!(
            self.reconnect.multiplier >= 1.0,
            "reconnect.multiplier must be at least 1.0"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.reconnect.jitter_factor),
            "reconnect.jitter_factor must be within [0, 1]"
        );
        if let Some(credentials) = &self.credentials {
            anyhow::ensure!(
                !credentials.api_key.is_empty() && !credentials.api_secret.is_empty(),
                "credentials need both api_key and api_secret"
            );
        }
        Ok(())
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.channels
            .iter()
            .map(|entry| Channel::with_products(entry.name.clone(), entry.product_ids.iter().cloned()))
            .collect()
    }

    pub fn stream_config(&self) -> StreamConfig {
        let mut heartbeat = HeartbeatConfig::new(
            Duration::from_millis(self.heartbeat.ping_interval_ms),
            Duration::from_millis(self.heartbeat.pong_timeout_ms),
        );
        heartbeat.traffic_as_liveness = self.heartbeat.traffic_as_liveness;

        StreamConfig {
            heartbeat,
            sync_server_time: self.sync_server_time,
            emit_raw_messages: self.emit_raw_messages,
        }
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            start_closed: false,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect: ReconnectConfig::new(
                Duration::from_millis(self.reconnect.initial_delay_ms),
                Duration::from_millis(self.reconnect.max_delay_ms),
                self.reconnect.multiplier,
                self.reconnect.jitter_factor,
                self.reconnect.max_attempts,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Map;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(Some(Map::new()))
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: Map<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(Some(map))
    }

    const SAMPLE: &str = r#"
channels:
  - name: ticker
    product_ids: [BTC-USD, ETH-USD]
  - name: status
heartbeat:
  ping_interval_ms: 5000
reconnect:
  max_attempts: 5
"#;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = TailConfig::from_yaml(SAMPLE, no_env()).unwrap();
        assert_eq!(config.url, ADVANCED_TRADE_WS_URL);
        assert!(config.credentials.is_none());
        assert_eq!(config.heartbeat.ping_interval_ms, 5_000);
        assert_eq!(config.heartbeat.pong_timeout_ms, 10_000);
        assert_eq!(config.reconnect.initial_delay_ms, 1_000);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert!(!config.sync_server_time);
    }

    #[test]
    fn test_channels_converted() {
        let config = TailConfig::from_yaml(SAMPLE, no_env()).unwrap();
        let channels = config.channels();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].channel, ChannelName::Ticker);
        assert_eq!(channels[0].product_ids(), ["BTC-USD", "ETH-USD"]);
        assert_eq!(channels[1].channel, ChannelName::Status);
        assert!(channels[1].product_ids.is_none());
    }

    #[test]
    fn test_environment_overrides_file() {
        let config = TailConfig::from_yaml(
            SAMPLE,
            env(&[
                ("COINBASE_STREAM__URL", "ws://localhost:9000"),
                ("COINBASE_STREAM__SYNC_SERVER_TIME", "true"),
                ("COINBASE_STREAM__HEARTBEAT__PONG_TIMEOUT_MS", "2500"),
            ]),
        )
        .unwrap();
        assert_eq!(config.url, "ws://localhost:9000");
        assert!(config.sync_server_time);
        assert_eq!(config.heartbeat.pong_timeout_ms, 2_500);
        assert_eq!(config.heartbeat.ping_interval_ms, 5_000);
    }

    #[test]
    fn test_adapter_settings() {
        let config = TailConfig::from_yaml(SAMPLE, no_env()).unwrap();
        let stream = config.stream_config();
        assert_eq!(stream.heartbeat.ping_interval, Duration::from_secs(5));
        assert_eq!(stream.heartbeat.pong_timeout, Duration::from_secs(10));

        let options = config.connect_options();
        assert!(!options.start_closed);
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.reconnect.max_attempts, 5);
        assert_eq!(options.reconnect.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let yaml = "reconnect:\n  multiplier: 0.5\n";
        assert!(TailConfig::from_yaml(yaml, no_env()).is_err());

        let yaml = "credentials:\n  api_key: key\n  api_secret: \"\"\n";
        assert!(TailConfig::from_yaml(yaml, no_env()).is_err());
    }

    #[test]
    fn test_secret_not_serialized() {
        let yaml = "credentials:\n  api_key: key\n  api_secret: hunter2\n";
        let config = TailConfig::from_yaml(yaml, no_env()).unwrap();
        let dumped = serde_yaml::to_string(&config).unwrap();
        assert!(dumped.contains("api_key: key"));
        assert!(!dumped.contains("hunter2"));
    }
}
