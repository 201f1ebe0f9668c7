use std::time::Duration;

/// Default settings for the conversion client.
#[derive(Debug, Clone, Copy)]
pub struct ClientDefaults {
    pub api_base: &'static str,
    pub model_version: &'static str,
    pub language: &'static str,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    pub request_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
}

pub const CLIENT_DEFAULTS: ClientDefaults = ClientDefaults {
    api_base: "https://mineru.net/api/v4",
    model_version: "vlm",
    language: "japan",
    poll_interval_secs: 5,
    max_poll_attempts: 120,
    request_timeout_secs: 30,
    transfer_timeout_secs: 300,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: String,
    pub api_token: String,
    /// Passed through to the service untouched.
    pub model_version: String,
    pub language: String,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// JSON API calls.
    pub request_timeout: Duration,
    /// Upload and result download.
    pub transfer_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: CLIENT_DEFAULTS.api_base.to_string(),
            api_token: String::new(),
            model_version: CLIENT_DEFAULTS.model_version.to_string(),
            language: CLIENT_DEFAULTS.language.to_string(),
            poll_interval: Duration::from_secs(CLIENT_DEFAULTS.poll_interval_secs),
            max_poll_attempts: CLIENT_DEFAULTS.max_poll_attempts,
            request_timeout: Duration::from_secs(CLIENT_DEFAULTS.request_timeout_secs),
            transfer_timeout: Duration::from_secs(CLIENT_DEFAULTS.transfer_timeout_secs),
        }
    }
}

/// Retry policy for the result download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random delay added to each backoff.
    pub max_jitter: Duration,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl DownloadPolicy {
    /// Delay before retry number `attempt` (1-based): exponential, capped, plus jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        delay + jitter(self.max_jitter)
    }
}

fn jitter(max: Duration) -> Duration {
    use rand::Rng;
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 { return Duration::ZERO; }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}
