use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::service::framing::Framing;
use crate::service::retry::{RetryPolicy, RetryStrategy};
use crate::types::chat::{HarmBlockThreshold, HarmCategory};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Layered service configuration.
///
/// Resolution order (later wins): built-in defaults, `RELAY_*` variables
/// using `__` between section and key, then the plain deployment variables
/// `GEMINI_API_KEY`, `PORT` and `ALLOWED_ORIGINS`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub gemini: GeminiConfig,
    pub limits: LimitsConfig,
    pub retry: RetryConfig,
    pub relay: RelayConfig,
    pub defaults: GenerationDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub listen_host: String,
    pub port: u16,
    pub loglevel: String,
    /// Comma separated origin list. `None` allows any origin.
    pub allowed_origins: Option<String>,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            port: 3001,
            loglevel: "info".to_string(),
            allowed_origins: None,
        }
    }
}

impl BasicConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.port)
    }

    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: Url,
    pub chat_model: String,
    pub image_model: String,
    pub connect_timeout_secs: u64,
    pub image_timeout_secs: u64,
    pub enable_search_grounding: bool,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Url::parse(DEFAULT_GEMINI_BASE_URL).expect("default base url is valid"),
            chat_model: "gemini-2.5-flash".to_string(),
            image_model: "imagen-3.0-generate-002".to_string(),
            connect_timeout_secs: 10,
            image_timeout_secs: 120,
            enable_search_grounding: true,
        }
    }
}

impl GeminiConfig {
    /// The credential, ignoring blank values left behind by `.env` templates.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_history_length: usize,
    /// Counted in characters, not bytes.
    pub max_prompt_length: usize,
    pub max_media_parts: usize,
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_history_length: 50,
            max_prompt_length: 15_000,
            max_media_parts: 8,
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub policy: RetryStrategy,
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy: RetryStrategy::Exponential,
            max_attempts: 3,
            initial_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            strategy: self.policy,
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub framing: Framing,
    pub marker: String,
    pub chunk_timeout_secs: u64,
    pub deadline_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            framing: Framing::Marker,
            marker: "__RELAY_META__".to_string(),
            chunk_timeout_secs: 60,
            deadline_secs: 300,
        }
    }
}

/// Generation settings applied when a request leaves a field out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub system_instruction: Option<String>,
    #[serde(skip, default = "default_safety_thresholds")]
    pub safety_thresholds: BTreeMap<HarmCategory, HarmBlockThreshold>,
}

fn default_safety_thresholds() -> BTreeMap<HarmCategory, HarmBlockThreshold> {
    [
        HarmCategory::HarmCategoryHarassment,
        HarmCategory::HarmCategoryHateSpeech,
        HarmCategory::HarmCategorySexuallyExplicit,
        HarmCategory::HarmCategoryDangerousContent,
    ]
    .into_iter()
    .map(|c| (c, HarmBlockThreshold::BlockMediumAndAbove))
    .collect()
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            max_output_tokens: 8192,
            system_instruction: None,
            safety_thresholds: default_safety_thresholds(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("RELAY_").split("__"))
            .merge(
                Env::raw()
                    .only(&["GEMINI_API_KEY", "PORT", "ALLOWED_ORIGINS"])
                    .map(|key| {
                        if key.as_str().eq_ignore_ascii_case("gemini_api_key") {
                            "gemini.api_key".into()
                        } else if key.as_str().eq_ignore_ascii_case("port") {
                            "basic.port".into()
                        } else {
                            "basic.allowed_origins".into()
                        }
                    }),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_documented_limits() {
        let cfg = Config::default();
        assert_eq!(cfg.limits.max_history_length, 50);
        assert_eq!(cfg.limits.max_prompt_length, 15_000);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.policy, RetryStrategy::Exponential);
        assert_eq!(cfg.relay.framing, Framing::Marker);
        assert!(cfg.gemini.credential().is_none());
        assert_eq!(cfg.defaults.safety_thresholds.len(), 4);
    }

    #[test]
    fn deployment_variables_override_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("GEMINI_API_KEY", "secret");
            jail.set_env("PORT", "8080");
            jail.set_env("ALLOWED_ORIGINS", "https://a.example, https://b.example");
            jail.set_env("RELAY_LIMITS__MAX_HISTORY_LENGTH", "20");
            jail.set_env("RELAY_RETRY__POLICY", "immediate");
            jail.set_env("RELAY_RELAY__FRAMING", "ndjson");

            let cfg = Config::load()?;
            assert_eq!(cfg.gemini.credential(), Some("secret"));
            assert_eq!(cfg.basic.port, 8080);
            assert_eq!(
                cfg.basic.origins(),
                vec!["https://a.example".to_string(), "https://b.example".to_string()]
            );
            assert_eq!(cfg.limits.max_history_length, 20);
            assert_eq!(cfg.retry.policy, RetryStrategy::Immediate);
            assert_eq!(cfg.relay.framing, Framing::Ndjson);
            Ok(())
        });
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        let mut cfg = Config::default();
        cfg.gemini.api_key = Some("   ".to_string());
        assert!(cfg.gemini.credential().is_none());
    }

    #[test]
    fn retry_policy_never_has_zero_attempts() {
        let cfg = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(cfg.to_policy().max_attempts, 1);
    }
}
