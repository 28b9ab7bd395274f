//! Common page data and deferred template rendering.

use chrono::Utc;
use serde_json::Value;

use super::RequestContext;
use crate::handlers::{cli::h_cli, system::h_system, user::h_user};
use crate::menu::{Menu, MenuEntry};
use crate::perms::Perm;
use crate::template::{Page, PageUser};

/// Top-level navigation shown on every page.
pub fn main_menu() -> Menu {
    Menu::new(vec![
        MenuEntry::new("/user", "User", Perm::USER, h_user),
        MenuEntry::new("/system", "System", Perm::SYS_ADMIN, h_system),
        MenuEntry::new("/cli", "CLI", Perm::CLI, h_cli),
    ])
}

impl RequestContext {
    pub fn page_def(&self) -> Page {
        let mut mainmenu = main_menu();
        if let Some(hook) = self.portal.main_menu_override.clone() {
            hook(self, &mut mainmenu);
        }

        let server = &self.portal.config.server;

        let crumbs = self.crumbs().to_vec();
        let title = crumbs
            .iter()
            .map(|c| c.desc.as_str())
            .collect::<Vec<_>>()
            .join(" > ");
        let page_title = crumbs.last().map(|c| c.long.clone()).unwrap_or_default();

        let sub_menu = match &self.page_menu {
            Some(menu) => menu.to_link_col(self, self.page_menu_depth),
            None => Vec::new(),
        };

        Page {
            url: self.fullpath.clone(),
            title: format!("{} - {}", title, server.system_name),
            page_title,
            menu: mainmenu.to_link_col(self, 0),
            sub_menu,
            crumbs,
            css: self.portal.config.ui.css.clone(),
            javascript: self.portal.config.ui.javascript.clone(),
            sys_name: server.system_name.clone(),
            version: if self.is_logged_in() {
                env!("CARGO_PKG_VERSION").to_string()
            } else {
                String::new()
            },
            public_url: server.public_url.clone(),
            render_stamp: Utc::now().format(&self.portal.config.ui.time_format).to_string(),
            user: self.the_user().map(|u| PageUser {
                username: u.username.clone(),
                full_name: u.full_name.clone(),
                sysadmin: self.is_sysadmin(),
            }),
        }
    }

    /// Defer rendering of `name` with `data` until flush.
    pub fn page_show(&mut self, name: &str, data: Value) {
        if self.staged.content_type.is_none() {
            self.set_content_type("text/html");
        }
        self.staged.template = Some((name.to_string(), data));
    }

    pub fn template_name(&self) -> Option<&str> {
        self.staged.template.as_ref().map(|(n, _)| n.as_str())
    }

    pub fn template_data(&self) -> Option<&Value> {
        self.staged.template.as_ref().map(|(_, d)| d)
    }
}
