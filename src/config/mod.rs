use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub features: FeatureConfig,
    pub log: LogConfig,
    pub iptrk: IptrkConfig,
    pub ui: UiConfig,
    /// String slots referenced from form tags as `CFG_<name>`.
    pub form_slots: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub nodename: String,
    pub http_host: String,
    pub public_url: String,
    pub system_name: String,
    pub static_root: String,
    /// Extra Tera templates (glob); empty uses only the built-in set.
    pub template_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub token_secret: String,
    pub token_expiry_minutes: i64,
    pub token_refresh_minutes: i64,
    pub csrf_expiry_minutes: i64,
    pub cookie_name: String,
    pub secure_cookies: bool,
    pub csp: String,
    pub trusted_proxies: Vec<String>,
    pub sysadmin_restrict: Vec<String>,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub cli_enabled: bool,
    pub api_enabled: bool,
    pub oauth_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Empty disables the access log.
    pub access_log_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IptrkConfig {
    pub max: u32,
    pub expire_minutes: i64,
    pub sweep_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    pub css: String,
    pub javascript: String,
    pub time_format: String,
    pub user_agent: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(v) = env::var("PORTAL_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("PORTAL_NODENAME") {
            self.server.nodename = v;
        }
        if let Ok(v) = env::var("PORTAL_HTTP_HOST") {
            self.server.http_host = v;
        }
        if let Ok(v) = env::var("PORTAL_PUBLIC_URL") {
            self.server.public_url = v;
        }
        if let Ok(v) = env::var("PORTAL_SYSTEM_NAME") {
            self.server.system_name = v;
        }
        if let Ok(v) = env::var("PORTAL_STATIC_ROOT") {
            self.server.static_root = v;
        }
        if let Ok(v) = env::var("PORTAL_TEMPLATE_DIR") {
            self.server.template_dir = v;
        }

        // Security overrides
        if let Ok(v) = env::var("PORTAL_TOKEN_SECRET") {
            self.security.token_secret = v;
        }
        if let Ok(v) = env::var("PORTAL_TOKEN_EXPIRATION_MINUTES") {
            self.security.token_expiry_minutes = v.parse().unwrap_or(self.security.token_expiry_minutes);
        }
        if let Ok(v) = env::var("PORTAL_TOKEN_REFRESH_MINUTES") {
            self.security.token_refresh_minutes = v.parse().unwrap_or(self.security.token_refresh_minutes);
        }
        if let Ok(v) = env::var("PORTAL_CSRF_EXPIRATION_MINUTES") {
            self.security.csrf_expiry_minutes = v.parse().unwrap_or(self.security.csrf_expiry_minutes);
        }
        if let Ok(v) = env::var("PORTAL_COOKIE_NAME") {
            self.security.cookie_name = v;
        }
        if let Ok(v) = env::var("PORTAL_SECURE_COOKIES") {
            self.security.secure_cookies = v.parse().unwrap_or(self.security.secure_cookies);
        }
        if let Ok(v) = env::var("PORTAL_CSP") {
            self.security.csp = v;
        }
        if let Ok(v) = env::var("PORTAL_XFF_TRUSTED") {
            self.security.trusted_proxies = split_list(&v);
        }
        if let Ok(v) = env::var("PORTAL_SYSADMIN_RESTRICT") {
            self.security.sysadmin_restrict = split_list(&v);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }
        // Cookie names are always stored lower-cased
        self.security.cookie_name = self.security.cookie_name.to_lowercase();

        // Feature overrides
        if let Ok(v) = env::var("PORTAL_CLI_ENABLED") {
            self.features.cli_enabled = v.parse().unwrap_or(self.features.cli_enabled);
        }
        if let Ok(v) = env::var("PORTAL_API_ENABLED") {
            self.features.api_enabled = v.parse().unwrap_or(self.features.api_enabled);
        }
        if let Ok(v) = env::var("PORTAL_OAUTH_ENABLED") {
            self.features.oauth_enabled = v.parse().unwrap_or(self.features.oauth_enabled);
        }

        // Log overrides
        if let Ok(v) = env::var("PORTAL_LOG_FILE") {
            self.log.access_log_file = v;
        }

        // Iptrk overrides
        if let Ok(v) = env::var("PORTAL_IPTRK_MAX") {
            self.iptrk.max = v.parse().unwrap_or(self.iptrk.max);
        }
        if let Ok(v) = env::var("PORTAL_IPTRK_EXPIRE_MINUTES") {
            self.iptrk.expire_minutes = v.parse().unwrap_or(self.iptrk.expire_minutes);
        }

        // UI overrides
        if let Ok(v) = env::var("PORTAL_CSS") {
            self.ui.css = v;
        }
        if let Ok(v) = env::var("PORTAL_JAVASCRIPT") {
            self.ui.javascript = v;
        }
        if let Ok(v) = env::var("PORTAL_TIME_FORMAT") {
            self.ui.time_format = v;
        }
        if let Ok(v) = env::var("PORTAL_USER_AGENT") {
            self.ui.user_agent = v;
        }

        for (key, value) in env::vars() {
            if let Some(name) = key.strip_prefix("CFG_") {
                self.form_slots.insert(name.to_string(), value);
            }
        }

        self
    }

    /// Resolve a `CFG_<name>` reference against the form slots; other
    /// values are returned unchanged.
    pub fn resolve_slot<'a>(&'a self, value: &'a str) -> &'a str {
        match value.strip_prefix("CFG_") {
            Some(name) => self.form_slots.get(name).map(String::as_str).unwrap_or(""),
            None => value,
        }
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig::default(),
            security: SecurityConfig {
                token_secret: "portal-development-secret".to_string(),
                token_expiry_minutes: 20,
                token_refresh_minutes: 5,
                csrf_expiry_minutes: 60,
                cookie_name: "_portal".to_string(),
                secure_cookies: false,
                csp: "default-src 'self'".to_string(),
                trusted_proxies: vec!["127.0.0.1/8".to_string(), "::1/128".to_string()],
                sysadmin_restrict: Vec::new(),
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string()],
            },
            features: FeatureConfig {
                cli_enabled: true,
                api_enabled: true,
                oauth_enabled: true,
            },
            log: LogConfig {
                access_log_file: String::new(),
            },
            iptrk: IptrkConfig {
                max: 10,
                expire_minutes: 60,
                sweep_secs: 60,
            },
            ui: UiConfig::default(),
            form_slots: default_form_slots(),
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.security.token_secret = String::new();
        config.security.secure_cookies = true;
        config.security.cors_origins = vec!["https://staging.example.com".to_string()];
        config
    }

    fn production() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Production;
        config.security.token_secret = String::new();
        config.security.secure_cookies = true;
        config.security.enable_cors = false;
        config.security.cors_origins = Vec::new();
        config.features.cli_enabled = false;
        config
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            nodename: "portal".to_string(),
            http_host: "localhost".to_string(),
            public_url: "http://localhost:3000".to_string(),
            system_name: "Portal".to_string(),
            static_root: "webroot".to_string(),
            template_dir: String::new(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            css: "/css/style.css".to_string(),
            javascript: "/js/portal.js".to_string(),
            time_format: "%Y-%m-%d %H:%M:%S".to_string(),
            user_agent: format!("portal-core/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn default_form_slots() -> BTreeMap<String, String> {
    let mut slots = BTreeMap::new();
    slots.insert("UserMinLen".to_string(), "3".to_string());
    slots.insert("UserExample".to_string(), "jdoe".to_string());
    slots
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}
