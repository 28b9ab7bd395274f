//! Breadcrumb trail built during menu descent.

use tracing::error;

use super::RequestContext;
use crate::menu::Link;

#[derive(Debug, Clone)]
pub struct Crumbs {
    list: Vec<Link>,
    path: String,
}

impl Default for Crumbs {
    fn default() -> Self {
        Self {
            list: Vec::new(),
            path: "/".to_string(),
        }
    }
}

impl Crumbs {
    pub fn links(&self) -> &[Link] {
        &self.list
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// An empty `link` with a description replaces the previous crumb.
    /// An empty description extends the path without showing a crumb.
    pub fn add(&mut self, link: &str, desc: &str, long: &str) {
        if link.is_empty() && !desc.is_empty() {
            self.list.pop();
        } else {
            self.path.push_str(link);
            if !link.is_empty() && !link.starts_with('?') {
                self.path.push('/');
            }
        }

        if !desc.is_empty() {
            self.list.push(Link::new(&self.path, desc, long));
        }
    }

    pub fn pop(&mut self) -> Option<Link> {
        let last = self.list.pop()?;
        self.path = match self.list.last() {
            Some(l) => l.link.clone(),
            None => "/".to_string(),
        };
        Some(last)
    }

    /// Path segments without the leading and trailing empty parts.
    pub fn parts(&self) -> Vec<String> {
        let mut parts: Vec<String> = self.path.split('/').skip(1).map(str::to_string).collect();
        if parts.last().map(|p| p.is_empty()).unwrap_or(false) {
            parts.pop();
        }
        parts
    }
}

impl RequestContext {
    pub fn add_crumb(&mut self, link: &str, desc: &str, long: &str) {
        self.crumbs.add(link, desc, long);
    }

    /// Remove the last crumb, returning `(link, desc, long)`.
    pub fn del_crumb(&mut self) -> (String, String, String) {
        match self.crumbs.pop() {
            Some(l) => (l.link, l.desc, l.long),
            None => {
                error!("DelCrumb() on empty Crumb Path");
                let nc = "NOCRUMB".to_string();
                (nc.clone(), nc.clone(), nc)
            }
        }
    }

    pub fn crumb_path(&self) -> &str {
        self.crumbs.path()
    }

    pub fn crumb_parts(&self) -> Vec<String> {
        self.crumbs.parts()
    }

    pub fn crumbs(&self) -> &[Link] {
        self.crumbs.links()
    }
}
