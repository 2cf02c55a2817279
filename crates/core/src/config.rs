use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `MARGIN_PULSE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Tunables for the margin computation itself.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Tolerance for the approximate subsystem match, in seconds.
    #[serde(default = "default_match_tolerance_secs")]
    pub match_tolerance_secs: i64,
    /// Attribution lookbehind/lookahead window, in days.
    #[serde(default = "default_attribution_window_days")]
    pub attribution_window_days: i64,
    /// Conversion rate from internal energy units to USD.
    #[serde(default = "default_energy_to_usd")]
    pub energy_to_usd: f64,
    /// Bots below this daily/weekly cost are excluded from every ranking.
    #[serde(default = "default_min_ranked_cost_usd")]
    pub min_ranked_cost_usd: f64,
    /// Free-cost share above which a bot counts as heavy free use.
    #[serde(default = "default_heavy_free_share_pct")]
    pub heavy_free_share_pct: f64,
    /// UTC offset defining business-day boundaries.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    /// Row cap for the free-cost-by-bot ranking.
    #[serde(default = "default_free_cost_ranking_size")]
    pub free_cost_ranking_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "margin-01".to_string()
}
fn default_match_tolerance_secs() -> i64 {
    5
}
fn default_attribution_window_days() -> i64 {
    7
}
fn default_energy_to_usd() -> f64 {
    0.01
}
fn default_min_ranked_cost_usd() -> f64 {
    10.0
}
fn default_heavy_free_share_pct() -> f64 {
    80.0
}
fn default_utc_offset_hours() -> i32 {
    8
}
fn default_free_cost_ranking_size() -> usize {
    30
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_tolerance_secs: default_match_tolerance_secs(),
            attribution_window_days: default_attribution_window_days(),
            energy_to_usd: default_energy_to_usd(),
            min_ranked_cost_usd: default_min_ranked_cost_usd(),
            heavy_free_share_pct: default_heavy_free_share_pct(),
            utc_offset_hours: default_utc_offset_hours(),
            free_cost_ranking_size: default_free_cost_ranking_size(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            engine: EngineConfig::default(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("MARGIN_PULSE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.match_tolerance_secs, 5);
        assert_eq!(cfg.engine.attribution_window_days, 7);
        assert_eq!(cfg.engine.energy_to_usd, 0.01);
        assert_eq!(cfg.engine.min_ranked_cost_usd, 10.0);
        assert_eq!(cfg.engine.utc_offset_hours, 8);
        assert_eq!(cfg.api.http_port, 8080);
    }
}
