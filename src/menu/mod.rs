//! Menu trees: the router and authorization gate of the UI.
//!
//! A menu is a flat list of entries; handlers build the next level right
//! before descending into it with [`RequestContext::ui_menu`].

pub mod links;
mod resolver;

use std::fmt;

use futures::future::BoxFuture;

use crate::context::RequestContext;
use crate::perms::Perm;

pub use links::{links_html, Link};

/// A menu handler. Handlers get the request context passed in and stage
/// their output onto it.
pub type HandlerFn = for<'a> fn(&'a mut RequestContext) -> BoxFuture<'a, ()>;

#[derive(Clone)]
pub struct MenuEntry {
    pub uri: String,
    pub desc: String,
    pub perms: Perm,
    pub handler: HandlerFn,
    /// Only used for rendering multi-level link columns.
    pub subs: Vec<MenuEntry>,
}

impl MenuEntry {
    pub fn new(uri: &str, desc: &str, perms: Perm, handler: HandlerFn) -> Self {
        Self {
            uri: uri.to_string(),
            desc: desc.to_string(),
            perms,
            handler,
            subs: Vec::new(),
        }
    }

    pub fn with_subs(mut self, subs: Vec<MenuEntry>) -> Self {
        self.subs = subs;
        self
    }
}

impl fmt::Debug for MenuEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuEntry")
            .field("uri", &self.uri)
            .field("desc", &self.desc)
            .field("perms", &self.perms.to_string())
            .field("subs", &self.subs)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Menu {
    pub entries: Vec<MenuEntry>,
}

impl Menu {
    pub fn new(entries: Vec<MenuEntry>) -> Self {
        Self { entries }
    }

    pub fn add(&mut self, entry: MenuEntry) {
        self.entries.push(entry);
    }

    pub fn get(&self, uri: &str) -> Option<&MenuEntry> {
        self.entries.iter().find(|m| m.uri == uri)
    }

    fn get_mut(&mut self, uri: &str) -> Option<&mut MenuEntry> {
        self.entries.iter_mut().find(|m| m.uri == uri)
    }

    /// Swap the handler of the first entry for `uri`.
    pub fn replace(&mut self, uri: &str, handler: HandlerFn) {
        if let Some(m) = self.get_mut(uri) {
            m.handler = handler;
        }
    }

    pub fn remove(&mut self, uri: &str) {
        if let Some(i) = self.entries.iter().position(|m| m.uri == uri) {
            self.entries.remove(i);
        }
    }

    /// Keep only the entries whose URI is listed.
    pub fn filter(&mut self, allowed: &[&str]) {
        self.entries.retain(|m| allowed.contains(&m.uri.as_str()));
    }

    pub fn add_perms(&mut self, uri: &str, perms: Perm) {
        if let Some(m) = self.get_mut(uri) {
            m.perms |= perms;
        }
    }

    pub fn del_perms(&mut self, uri: &str, perms: Perm) {
        if let Some(m) = self.get_mut(uri) {
            m.perms = m.perms.without(perms);
        }
    }

    pub fn set_perms(&mut self, uri: &str, perms: Perm) {
        if let Some(m) = self.get_mut(uri) {
            m.perms = perms;
        }
    }

    pub fn to_link_col(&self, ctx: &RequestContext, depth: usize) -> Vec<Link> {
        self.to_link_col_pfx(ctx, depth, "")
    }

    /// Links the caller may follow. Relative URIs are prefixed with `pfx`,
    /// or with one `../` per level of `depth` when there is no prefix.
    pub fn to_link_col_pfx(&self, ctx: &RequestContext, depth: usize, pfx: &str) -> Vec<Link> {
        let mut links = Vec::new();

        for m in &self.entries {
            if m.desc.is_empty() {
                continue;
            }

            if ctx
                .check_perms(&format!("ToLinkColPfx({})", m.desc), m.perms)
                .is_err()
            {
                continue;
            }

            // none+user entries are for anonymous visitors only
            if m.perms.contains(Perm::NONE) && m.perms.contains(Perm::USER) && ctx.is_logged_in() {
                continue;
            }

            if m.perms.contains(Perm::HIDDEN) {
                continue;
            }

            let mut link = m.uri.clone();
            if !link.is_empty() && !link.starts_with('?') {
                link.push('/');
            }

            if !m.uri.is_empty() && !m.uri.starts_with('/') {
                if !pfx.is_empty() {
                    link = format!("{}{}", pfx, link);
                } else {
                    link = format!("{}{}", "../".repeat(depth), link);
                }
            }

            let subs = if m.subs.is_empty() {
                Vec::new()
            } else {
                Menu::new(m.subs.clone()).to_link_col_pfx(ctx, depth + 1, &link)
            };

            let mut l = Link::new(&link, &m.desc, "");
            l.subs = subs;
            links.push(l);
        }

        links
    }
}
