//! Path descent through a menu.

use axum::http::StatusCode;
use tracing::error;

use super::Menu;
use crate::context::RequestContext;
use crate::handlers::error::{h_error, h_no_access};
use crate::perms::Perm;

impl RequestContext {
    /// Apply the sub-menu override, then follow the remaining path.
    pub async fn ui_menu(&mut self, mut menu: Menu) {
        if let Some(hook) = self.portal().sub_menu_override.clone() {
            hook(self, &mut menu);
        }

        self.menu_path(menu).await;
    }

    /// Match the first path segment against `menu` and run the handler of
    /// the first entry whose URI equals it. Exactly one handler runs, or
    /// an error page is staged.
    pub async fn menu_path(&mut self, menu: Menu) {
        // Directory URLs always end in a slash
        if self.path().is_empty() {
            let target = format!("{}/", self.fullpath());
            self.set_redirect(&target, StatusCode::FOUND);
            return;
        }

        self.set_page_menu(Some(menu.clone()));

        let segment = self.path()[0].clone();
        let Some(entry) = menu.entries.into_iter().find(|m| m.uri == segment) else {
            error!("Menu: Not Found ({})", self.fullpath());
            h_error(self, StatusCode::NOT_FOUND).await;
            return;
        };

        if let Err(err) = self.check_perms(&format!("MenuPath({})", segment), entry.perms) {
            error!("Menu: No {} permission for MenuPath({}): {}", entry.perms, segment, err);
            h_no_access(self).await;
            return;
        }

        if !entry.perms.contains(Perm::NOCRUMB) {
            self.add_crumb(&entry.uri, &entry.desc, "");
        }

        if !entry.uri.is_empty() && !entry.uri.starts_with('?') {
            self.page_menu_descend();
        }

        self.consume_segment();

        if entry.perms.contains(Perm::NOSUBS) && self.has_subs() {
            h_no_access(self).await;
            return;
        }

        (entry.handler)(self).await;
    }
}
