//! Process-wide services shared by every request.

use std::sync::Arc;

use crate::access_log::AccessLog;
use crate::auth::{CsrfService, SessionCookie, StaticUserDirectory, TokenService, UserDirectory};
use crate::command::{builtin_tree, CommandDispatcher};
use crate::config::AppConfig;
use crate::context::RequestContext;
use crate::iptrk::IpTracker;
use crate::menu::Menu;
use crate::net::{NetworkError, TrustedProxies};
use crate::perms::AppPermHook;
use crate::template::{TeraTemplates, TemplateRenderer};

/// Callback that may rewrite a menu before it is rendered or descended into.
pub type MenuOverride = Arc<dyn Fn(&RequestContext, &mut Menu) + Send + Sync>;

/// Everything a request needs besides its own state. Built once at
/// startup and shared behind an `Arc`.
pub struct Portal {
    pub config: AppConfig,
    pub tokens: Arc<TokenService>,
    pub csrf: CsrfService,
    pub trusted: TrustedProxies,
    pub sysadmin_restrict: TrustedProxies,
    pub cookie: SessionCookie,
    pub iptrk: Arc<IpTracker>,
    pub users: Arc<dyn UserDirectory>,
    pub commands: Arc<dyn CommandDispatcher>,
    pub templates: Arc<dyn TemplateRenderer>,
    pub access_log: AccessLog,
    pub perm_hook: Option<AppPermHook>,
    pub main_menu_override: Option<MenuOverride>,
    pub sub_menu_override: Option<MenuOverride>,
}

impl Portal {
    pub fn builder(config: AppConfig) -> PortalBuilder {
        PortalBuilder {
            config,
            users: None,
            commands: None,
            templates: None,
            perm_hook: None,
            main_menu_override: None,
            sub_menu_override: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid network in configuration: {0}")]
    Network(#[from] NetworkError),

    #[error("Template loading failed: {0}")]
    Templates(#[from] tera::Error),
}

pub struct PortalBuilder {
    config: AppConfig,
    users: Option<Arc<dyn UserDirectory>>,
    commands: Option<Arc<dyn CommandDispatcher>>,
    templates: Option<Arc<dyn TemplateRenderer>>,
    perm_hook: Option<AppPermHook>,
    main_menu_override: Option<MenuOverride>,
    sub_menu_override: Option<MenuOverride>,
}

impl PortalBuilder {
    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn commands(mut self, commands: Arc<dyn CommandDispatcher>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn templates(mut self, templates: Arc<dyn TemplateRenderer>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn perm_hook(mut self, hook: AppPermHook) -> Self {
        self.perm_hook = Some(hook);
        self
    }

    pub fn main_menu_override(mut self, hook: MenuOverride) -> Self {
        self.main_menu_override = Some(hook);
        self
    }

    pub fn sub_menu_override(mut self, hook: MenuOverride) -> Self {
        self.sub_menu_override = Some(hook);
        self
    }

    pub fn build(self) -> Result<Portal, BuildError> {
        let config = self.config;
        let security = &config.security;

        let trusted = TrustedProxies::parse(&security.trusted_proxies)?;
        let sysadmin_restrict = TrustedProxies::parse(&security.sysadmin_restrict)?;

        let tokens = Arc::new(TokenService::new(
            &security.token_secret,
            &config.server.nodename,
            security.token_refresh_minutes,
        ));
        let csrf = CsrfService::new(Arc::clone(&tokens), security.csrf_expiry_minutes);
        let cookie = SessionCookie::new(&security.cookie_name, security.secure_cookies);

        let templates: Arc<dyn TemplateRenderer> = match self.templates {
            Some(t) => t,
            None => Arc::new(TeraTemplates::with_dir(&config.server.template_dir)?),
        };
        let commands = self
            .commands
            .unwrap_or_else(|| Arc::new(builtin_tree(&config.server.system_name)) as Arc<dyn CommandDispatcher>);
        let users = self
            .users
            .unwrap_or_else(|| Arc::new(StaticUserDirectory::new()) as Arc<dyn UserDirectory>);

        Ok(Portal {
            iptrk: Arc::new(IpTracker::new(config.iptrk.max)),
            access_log: AccessLog::new(&config.log.access_log_file),
            tokens,
            csrf,
            trusted,
            sysadmin_restrict,
            cookie,
            users,
            commands,
            templates,
            perm_hook: self.perm_hook,
            main_menu_override: self.main_menu_override,
            sub_menu_override: self.sub_menu_override,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_defaults() {
        let portal = Portal::builder(AppConfig::development()).build().unwrap();
        assert_eq!(portal.cookie.name, "_portal");
        assert!(!portal.trusted.is_empty());
        assert!(portal.sysadmin_restrict.is_empty());
        assert!(!portal.access_log.is_enabled());
    }

    #[test]
    fn test_bad_network_is_rejected() {
        let mut config = AppConfig::development();
        config.security.sysadmin_restrict = vec!["not-a-network".to_string()];
        assert!(matches!(
            Portal::builder(config).build(),
            Err(BuildError::Network(_))
        ));
    }
}
