use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthflowSettings {
    pub application: ApplicationSettings,
    pub logging: LoggingSettings,
    pub retry: RetrySettings,
    pub breaker: BreakerSettings,
    pub providers: Vec<ProviderSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// Base URL the provider redirects back to; per-provider `redirect_uri`
    /// values default to `{redirect_base_url}/auth/callback`
    pub redirect_base_url: String,
    /// Wall-clock bound on one popup or widget login attempt
    pub login_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub success_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub name: String,
    pub scopes: Vec<String>,

    // Direct values (can be overridden by environment variables)
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Telegram bot token, also the HMAC key for widget payload verification
    pub bot_token: Option<String>,

    // Environment variable names for overrides
    pub client_id_env: Option<String>,
    pub client_secret_env: Option<String>,
    pub bot_token_env: Option<String>,

    /// Override the shared `{redirect_base_url}/auth/callback` redirect URI
    pub redirect_uri: Option<String>,
    /// LINE bot-prompt default for calls that do not set one
    pub bot_prompt: Option<String>,
    pub enabled: bool,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            redirect_base_url: "http://localhost:8080".to_string(),
            login_timeout_secs: 120,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            success_threshold: 2,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            scopes: Vec::new(),
            client_id: None,
            client_secret: None,
            bot_token: None,
            client_id_env: None,
            client_secret_env: None,
            bot_token_env: None,
            redirect_uri: None,
            bot_prompt: None,
            enabled: true,
        }
    }
}

impl ProviderSettings {
    /// Resolve the client ID, preferring the configured environment variable
    #[must_use]
    pub fn get_client_id(&self) -> Option<String> {
        Self::resolve(self.client_id_env.as_deref(), self.client_id.as_deref())
    }

    /// Resolve the client secret, preferring the configured environment variable
    #[must_use]
    pub fn get_client_secret(&self) -> Option<String> {
        Self::resolve(self.client_secret_env.as_deref(), self.client_secret.as_deref())
    }

    /// Resolve the bot token, preferring the configured environment variable
    #[must_use]
    pub fn get_bot_token(&self) -> Option<String> {
        Self::resolve(self.bot_token_env.as_deref(), self.bot_token.as_deref())
    }

    fn resolve(env_name: Option<&str>, direct: Option<&str>) -> Option<String> {
        if let Some(name) = env_name {
            if let Ok(value) = std::env::var(name) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        direct.map(String::from).filter(|v| !v.is_empty())
    }
}

impl AuthflowSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logger initialization fails
    /// - Settings file cannot be read or parsed
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        settings.initialize_logging()?;
        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading)
    /// 2. Settings.toml in `AUTHFLOW_SECRETS_DIR` (if set and present)
    /// 3. Settings.toml in the current directory (if present)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed.
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            let toml_content = fs::read_to_string(&default_config_path)?;
            settings = basic_toml::from_str(&toml_content)?;
            log::debug!("loaded base settings from {}", default_config_path.display());
        }

        if let Ok(secrets_dir) = std::env::var("AUTHFLOW_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                let secrets_toml_content = fs::read_to_string(&secrets_path)?;
                settings = basic_toml::from_str(&secrets_toml_content)?;
                log::debug!("overriding settings from {}", secrets_path.display());
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_retry_env_overrides(&mut settings.retry);
        Self::apply_breaker_env_overrides(&mut settings.breaker);
        if let Ok(level) = std::env::var("AUTHFLOW_LOG_LEVEL") {
            settings.logging.level = level;
        }
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(redirect_base_url) = std::env::var("REDIRECT_BASE_URL") {
            app_settings.redirect_base_url = redirect_base_url;
        }
        Self::apply_numeric_env_override("LOGIN_TIMEOUT_SECS", &mut app_settings.login_timeout_secs);
    }

    fn apply_retry_env_overrides(retry_settings: &mut RetrySettings) {
        if let Ok(value_str) = std::env::var("RETRY_MAX_RETRIES") {
            if let Ok(value) = value_str.parse::<u32>() {
                retry_settings.max_retries = value;
            }
        }
        Self::apply_numeric_env_override("RETRY_BASE_DELAY_MS", &mut retry_settings.base_delay_ms);
        Self::apply_numeric_env_override("RETRY_MAX_DELAY_MS", &mut retry_settings.max_delay_ms);
    }

    fn apply_breaker_env_overrides(breaker_settings: &mut BreakerSettings) {
        if let Ok(value_str) = std::env::var("BREAKER_FAILURE_THRESHOLD") {
            if let Ok(value) = value_str.parse::<u32>() {
                breaker_settings.failure_threshold = value;
            }
        }
        Self::apply_numeric_env_override(
            "BREAKER_RECOVERY_TIMEOUT_SECS",
            &mut breaker_settings.recovery_timeout_secs,
        );
    }

    /// Helper function to apply numeric environment variable overrides
    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    /// Initialize `env_logger`, honoring `RUST_LOG` over the configured level
    ///
    /// # Errors
    ///
    /// Returns an error if a global logger is already installed.
    fn initialize_logging(&self) -> Result<(), Box<dyn std::error::Error>> {
        if std::env::var("RUST_LOG").is_ok() {
            env_logger::try_init()?;
        } else {
            env_logger::Builder::new().parse_filters(&self.logging.level).try_init()?;
        }
        Ok(())
    }

    /// Settings entry for a provider, by platform name
    #[must_use]
    pub fn find_provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Shared redirect URI for a provider, honoring the per-provider override
    #[must_use]
    pub fn redirect_uri_for(&self, provider: &ProviderSettings) -> String {
        provider.redirect_uri.clone().unwrap_or_else(|| {
            format!(
                "{}/auth/callback",
                self.application.redirect_base_url.trim_end_matches('/')
            )
        })
    }
}
