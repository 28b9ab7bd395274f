//! Link columns handed to templates.

use serde::{Deserialize, Serialize};

use crate::form::html::{attr, text};

/// One rendered menu or crumb entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub link: String,
    pub desc: String,
    pub long: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subs: Vec<Link>,
}

impl Link {
    pub fn new(link: &str, desc: &str, long: &str) -> Self {
        Self {
            link: link.to_string(),
            desc: desc.to_string(),
            long: if long.is_empty() { desc.to_string() } else { long.to_string() },
            subs: Vec::new(),
        }
    }

    pub fn html(&self) -> String {
        format!(
            "<a href=\"{}\" title=\"{}\">{}</a>",
            attr(&self.link),
            attr(&self.long),
            text(&self.desc)
        )
    }
}

/// `<ul>` rendering of a link column; `class` marks the entry whose link
/// equals `active`.
pub fn links_html(links: &[Link], class: &str, active: &str) -> String {
    if links.is_empty() {
        return String::new();
    }

    let mut o = format!("<ul class=\"{}\">\n", attr(class));
    for l in links {
        if l.link == active {
            o.push_str("<li class=\"active\">");
        } else {
            o.push_str("<li>");
        }
        o.push_str(&l.html());
        if !l.subs.is_empty() {
            o.push('\n');
            o.push_str(&links_html(&l.subs, class, active));
        }
        o.push_str("</li>\n");
    }
    o.push_str("</ul>\n");
    o
}
