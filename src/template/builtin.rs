use std::error::Error as _;

use serde_json::Value;
use tera::{Context, ErrorKind, Tera};

use super::{RenderError, TemplateRenderer};

const LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8" />
<title>{{ title }}</title>
{% if css %}<link rel="stylesheet" href="{{ css }}" />
{% endif %}{% if javascript %}<script src="{{ javascript }}"></script>
{% endif %}</head>
<body>
<header>
<h1><a href="/">{{ sys_name }}</a></h1>
{% if user %}<p class="user">{{ user.full_name }} ({{ user.username }}){% if user.sysadmin %} [sysadmin]{% endif %} <a href="/logout/">Logout</a></p>
{% else %}<p class="user"><a href="/login/">Login</a></p>
{% endif %}{% if menu %}<ul class="menu">
{% for l in menu %}<li><a href="{{ l.link }}" title="{{ l.long }}">{{ l.desc }}</a></li>
{% endfor %}</ul>
{% endif %}</header>
<nav class="crumbs">{% for c in crumbs %}{% if not loop.first %} &gt; {% endif %}<a href="{{ c.link }}" title="{{ c.long }}">{{ c.desc }}</a>{% endfor %}</nav>
{% if sub_menu %}<ul class="submenu">
{% for l in sub_menu %}<li><a href="{{ l.link }}" title="{{ l.long }}">{{ l.desc }}</a></li>
{% endfor %}</ul>
{% endif %}<main>
{% if page_title %}<h2>{{ page_title }}</h2>
{% endif %}{% block content %}{% endblock content %}
</main>
<footer>{{ sys_name }}{% if version %} {{ version }}{% endif %} - {{ render_stamp }}</footer>
</body>
</html>
"#;

const INDEX: &str = r#"{% extends "layout.tmpl" %}{% block content %}<div class="home">
<p>Welcome to {{ sys_name }}.</p>
{% if user %}<p><a href="/user/{{ user.username }}/">Your profile</a></p>{% else %}<p>Please <a href="/login/">log in</a> to continue.</p>{% endif %}
</div>{% endblock content %}"#;

const ERROR: &str = r#"{% extends "layout.tmpl" %}{% block content %}<div class="error">
<ul>
{% for m in messages %}<li>{{ m }}</li>
{% endfor %}</ul>
</div>{% endblock content %}"#;

const LOGIN: &str = r#"{% extends "layout.tmpl" %}{% block content %}<div class="login">
{{ form | safe }}
</div>{% endblock content %}"#;

const CLI: &str = r#"{% extends "layout.tmpl" %}{% block content %}<div class="cli">
{{ form | safe }}
{% if error %}<p class="error">{{ error }}</p>
{% endif %}{% if output %}<pre>{{ output }}</pre>
{% endif %}</div>{% endblock content %}"#;

const OAUTH2_INDEX: &str = r#"{% extends "layout.tmpl" %}{% block content %}<div class="oauth2">
<p>OAuth2 endpoints of {{ sys_name }}:</p>
<ul>
<li>Authorization: <code>{{ public_url }}/oauth2/authorize</code></li>
<li>Token: <code>{{ public_url }}/oauth2/token</code></li>
<li>Information: <code>{{ public_url }}/oauth2/info</code></li>
</ul>
</div>{% endblock content %}"#;

const OAUTH2_AUTHORIZE: &str = r#"{% extends "layout.tmpl" %}{% block content %}<div class="oauth2">
<p>The application <strong>{{ client_id }}</strong> requests access to your account{% if scope %} (scope: {{ scope }}){% endif %}.</p>
<p>Upon approval you will be sent to <code>{{ redirect_uri }}</code>.</p>
{{ form | safe }}
</div>{% endblock content %}"#;

const SYSTEM_INDEX: &str = r#"{% extends "layout.tmpl" %}{% block content %}<div class="system">
<p>System administration for {{ sys_name }}.</p>
</div>{% endblock content %}"#;

const SYSTEM_IPTRK: &str = r#"{% extends "layout.tmpl" %}{% block content %}<div class="iptrk">
{% if entries %}<table>
<tr><th>Entered</th><th>Last</th><th>Status</th><th>Count</th><th>IP</th></tr>
{% for e in entries %}<tr><td>{{ e.entered }}</td><td>{{ e.last }}</td><td>{% if e.blocked %}blocked{% else %}okay{% endif %}</td><td>{{ e.count }}</td><td>{{ e.ip }}</td></tr>
{% endfor %}</table>
{% else %}<p>There are currently no entries</p>
{% endif %}{{ form | safe }}
</div>{% endblock content %}"#;

const USER_INDEX: &str = r#"{% extends "layout.tmpl" %}{% block content %}<div class="profile">
<dl>
<dt>Username</dt><dd>{{ profile.username }}</dd>
<dt>Full name</dt><dd>{{ profile.full_name }}</dd>
</dl>
{% if form %}{{ form | safe }}
{% endif %}</div>{% endblock content %}"#;

const BUILTIN: [(&str, &str); 10] = [
    ("layout.tmpl", LAYOUT),
    ("index.tmpl", INDEX),
    ("misc/error.tmpl", ERROR),
    ("misc/login.tmpl", LOGIN),
    ("misc/cli.tmpl", CLI),
    ("oauth2/index.tmpl", OAUTH2_INDEX),
    ("oauth2/authorize.tmpl", OAUTH2_AUTHORIZE),
    ("system/index.tmpl", SYSTEM_INDEX),
    ("system/iptrk.tmpl", SYSTEM_IPTRK),
    ("user/index.tmpl", USER_INDEX),
];

/// Tera-backed renderer. Templates are loaded once; `.tmpl` output is
/// HTML-escaped unless a value is piped through `safe`.
pub struct TeraTemplates {
    tera: Tera,
}

impl TeraTemplates {
    pub fn builtin() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![".tmpl"]);
        tera.add_raw_templates(BUILTIN.to_vec())?;
        Ok(Self { tera })
    }

    /// Built-ins plus (and overridden by) the templates matching `glob`.
    pub fn with_dir(glob: &str) -> Result<Self, tera::Error> {
        if glob.is_empty() {
            return Self::builtin();
        }

        // extend() keeps existing names, so load the overrides first
        let mut tera = Tera::parse(glob)?;
        tera.autoescape_on(vec![".tmpl"]);
        tera.extend(&Self::builtin()?.tera)?;
        tera.build_inheritance_chains()?;
        Ok(Self { tera })
    }
}

impl TemplateRenderer for TeraTemplates {
    fn render(&self, name: &str, data: &Value) -> Result<String, RenderError> {
        let context = Context::from_value(data.clone()).map_err(|e| RenderError::Failed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        self.tera.render(name, &context).map_err(|e| match e.kind {
            ErrorKind::TemplateNotFound(_) => RenderError::NotFound(name.to_string()),
            _ => {
                // Tera nests the useful message in the source chain
                let mut reason = e.to_string();
                let mut source = e.source();
                while let Some(s) = source {
                    reason = format!("{}: {}", reason, s);
                    source = s.source();
                }
                RenderError::Failed {
                    name: name.to_string(),
                    reason,
                }
            }
        })
    }
}
