//! Process-wide configuration (spec §6.5), loaded from environment (with an
//! optional `.env`-style layer), matching
//! `examples/original_source/src/aimq/config.py` field-for-field.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,

    pub worker_name: String,
    pub worker_idle_wait: f64,

    pub queue_max_retries: i32,
    pub queue_backoff_multiplier: f64,
    pub queue_max_backoff: f64,

    pub supabase_realtime_channel: String,
    pub supabase_realtime_event: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_key: None,
            worker_name: "peon".to_string(),
            worker_idle_wait: 10.0,
            queue_max_retries: 5,
            queue_backoff_multiplier: 2.0,
            queue_max_backoff: 300.0,
            supabase_realtime_channel: "aimq:jobs".to_string(),
            supabase_realtime_event: "job_enqueued".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset. Environment variables are matched
    /// case-insensitively, mirroring the Python settings model.
    pub fn from_env() -> anyhow::Result<Self> {
        let figment = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        match figment.try_deserialize::<PartialConfig>() {
            Ok(partial) => Ok(partial.into_config()),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Whether the realtime wake-up service should be started: both a URL
    /// and a key must be configured.
    pub fn realtime_enabled(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_key.is_some()
    }
}

/// Every field optional, so partially-set environments layer on top of
/// [`Config::default`] instead of failing to deserialize.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    supabase_url: Option<String>,
    supabase_key: Option<String>,
    worker_name: Option<String>,
    worker_idle_wait: Option<f64>,
    queue_max_retries: Option<i32>,
    queue_backoff_multiplier: Option<f64>,
    queue_max_backoff: Option<f64>,
    supabase_realtime_channel: Option<String>,
    supabase_realtime_event: Option<String>,
}

impl PartialConfig {
    fn into_config(self) -> Config {
        let defaults = Config::default();
        Config {
            supabase_url: self.supabase_url.or(defaults.supabase_url),
            supabase_key: self.supabase_key.or(defaults.supabase_key),
            worker_name: self.worker_name.unwrap_or(defaults.worker_name),
            worker_idle_wait: self.worker_idle_wait.unwrap_or(defaults.worker_idle_wait),
            queue_max_retries: self.queue_max_retries.unwrap_or(defaults.queue_max_retries),
            queue_backoff_multiplier: self
                .queue_backoff_multiplier
                .unwrap_or(defaults.queue_backoff_multiplier),
            queue_max_backoff: self.queue_max_backoff.unwrap_or(defaults.queue_max_backoff),
            supabase_realtime_channel: self
                .supabase_realtime_channel
                .unwrap_or(defaults.supabase_realtime_channel),
            supabase_realtime_event: self
                .supabase_realtime_event
                .unwrap_or(defaults.supabase_realtime_event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_source() {
        let cfg = Config::default();
        assert_eq!(cfg.worker_name, "peon");
        assert_eq!(cfg.worker_idle_wait, 10.0);
        assert_eq!(cfg.queue_max_retries, 5);
        assert_eq!(cfg.queue_backoff_multiplier, 2.0);
        assert_eq!(cfg.queue_max_backoff, 300.0);
        assert_eq!(cfg.supabase_realtime_channel, "aimq:jobs");
        assert_eq!(cfg.supabase_realtime_event, "job_enqueued");
        assert!(!cfg.realtime_enabled());
    }
}
