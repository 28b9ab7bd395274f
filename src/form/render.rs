use tracing::error;

use super::html::{attr, text};
use super::{field_access, is_true, FieldKind, FieldValue, FormError, FormStatus, Mode, Record};
use crate::config::AppConfig;
use crate::context::RequestContext;

type KeyVals = Vec<(String, String)>;

const READONLY: &str = " readonly";

/// Output of one record walk, merged upwards through nested records.
#[derive(Default)]
struct Rendered {
    body: String,
    buttons: String,
    neditable: usize,
    subs: Vec<String>,
    multipart: bool,
}

impl Rendered {
    fn merge(&mut self, other: Rendered) {
        self.body.push_str(&other.body);
        self.buttons.push_str(&other.buttons);
        self.neditable += other.neditable;
        self.subs.extend(other.subs);
        self.multipart |= other.multipart;
    }
}

struct Walker<'c> {
    ctx: &'c RequestContext,
    mode: Mode,
    section: String,
}

/// Render `record` as a complete `<form>`, editable or read-only, with the
/// `status` message and error underneath. Rendering problems are logged and
/// replaced by a short notice.
pub fn pfform(ctx: &RequestContext, record: &Record, status: &FormStatus, editable: bool) -> String {
    match render_form(ctx, record, status, editable) {
        Ok(html) => html,
        Err(e) => {
            error!("pfform: {}", e);
            "Problem encountered while rendering template".to_string()
        }
    }
}

fn render_form(ctx: &RequestContext, record: &Record, status: &FormStatus, editable: bool) -> Result<String, FormError> {
    let mode = if editable { Mode::Update } else { Mode::Read };
    let mut walker = Walker {
        ctx,
        mode,
        section: String::new(),
    };

    let idpfx = format!("{}-", record.name);
    let r = walker.record("", &[], record)?;

    let mut o = r.body;
    let mut buttons = r.buttons;
    if editable && buttons.is_empty() && r.neditable > 0 {
        buttons = render_string(
            &Vec::new(),
            "Update",
            "update",
            "submit",
            "submit",
            "",
            "",
            "",
            false,
            0,
            &ctx.portal().config,
        );
    }
    o.push_str(&buttons);

    if !walker.section.is_empty() {
        o.push_str("</ul>\n</fieldset>\n</li>\n");
    }

    for (class, msg, suffix) in [("okay", &status.message, "message"), ("error", &status.error, "error")] {
        if msg.is_empty() {
            continue;
        }
        let id = attr(&format!("{}{}", idpfx, suffix));
        o.push_str(&format!(
            "<li class=\"{}\">\n<label for=\"{}\">&nbsp;</label>\n<span id=\"{}\">\n{}</span>\n</li>\n",
            class,
            id,
            id,
            text(msg)
        ));
    }

    o.push_str(&form_tail());

    for sub in &r.subs {
        o.push_str("<hr />\n");
        o.push_str(sub);
    }

    Ok(format!("{}{}", form_head(ctx, r.multipart), o))
}

impl Walker<'_> {
    fn translate(&self, trail: &[&Record], s: &str) -> String {
        if s.is_empty() {
            return String::new();
        }
        match trail.iter().find_map(|r| r.translate.as_ref()) {
            Some(t) => t(self.ctx, s),
            None => s.to_string(),
        }
    }

    fn record(&mut self, idpfx: &str, outer: &[&Record], rec: &Record) -> Result<Rendered, FormError> {
        let mut trail: Vec<&Record> = Vec::with_capacity(outer.len() + 1);
        trail.push(rec);
        trail.extend_from_slice(outer);

        let idpfx = format!("{}{}-", idpfx, rec.name);
        let ctx = self.ctx;
        let cfg = &ctx.portal().config;
        let mut out = Rendered::default();
        let mut hides: Vec<(String, String)> = Vec::new();

        for f in &rec.fields {
            match &f.kind {
                FieldKind::Ignore => continue,
                FieldKind::Record(nested) => {
                    let r = self.record(&idpfx, &trail, nested)?;
                    out.merge(r);
                    continue;
                }
                _ => {}
            }

            let fname = f.name.as_str();

            if let Some(vis) = &f.visible {
                let shown = vis(self.ctx, fname).map_err(|e| {
                    FormError::Render(format!("{} Field '{}' visibility check failed: {}", rec.name, fname, e))
                })?;
                if !shown {
                    continue;
                }
            }

            let (ok, mut allowedit) = match field_access(self.ctx, self.mode, &trail, f) {
                Ok(access) => access,
                Err(_) if f.skip_fail_perm => continue,
                Err(e) => {
                    return Err(FormError::Render(format!(
                        "Field '{}:{}' has invalid permissions: {}",
                        rec.name, fname, e
                    )))
                }
            };
            if !ok {
                continue;
            }

            if f.label.is_empty() {
                continue;
            }
            let label = self.translate(&trail, &f.label);

            let kvs: KeyVals = match &f.options {
                Some(provider) => provider(self.ctx).map_err(|e| {
                    FormError::Render(format!("Field '{}' keyvals function failed: {}", fname, e))
                })?,
                None => Vec::new(),
            };

            let mut hint = self.translate(&trail, &f.hint);
            let placeholder = self.translate(&trail, &f.placeholder);

            if !f.form_edit || kvs.len() == 1 {
                allowedit = false;
            }
            let masknum = usize::from(f.mask);

            let mut opts = String::new();
            if !allowedit {
                opts.push_str(READONLY);
            }
            if f.required {
                opts.push_str(" required");
            }
            if !f.class.is_empty() {
                opts.push_str(&format!(" class=\"{}\"", attr(&f.class)));
            }
            if !placeholder.is_empty() {
                opts.push_str(&format!(" placeholder=\"{}\"", attr(cfg.resolve_slot(&placeholder))));
            }

            let mut minmax = String::new();
            if !f.min.is_empty() {
                minmax.push_str(&format!("minimum: {}", cfg.resolve_slot(&f.min)));
            }
            if !f.max.is_empty() {
                if !minmax.is_empty() {
                    minmax.push_str(", ");
                }
                minmax.push_str(&format!("maximum: {}", cfg.resolve_slot(&f.max)));
            }

            if self.section != f.section {
                if !self.section.is_empty() {
                    out.body.push_str("</ul>\n</fieldset>\n</li>\n");
                }
                self.section = f.section.clone();
                if !self.section.is_empty() {
                    out.body.push_str(&format!(
                        "<li>\n<fieldset>\n<legend>{}</legend>\n<ul>\n",
                        text(&self.section)
                    ));
                }
            }

            if f.kind == FieldKind::Hidden {
                let val = f.value.as_string();
                hides.push((fname.to_string(), if val.is_empty() { label } else { val }));
                continue;
            }

            if f.kind == FieldKind::Submit && out.neditable == 0 {
                continue;
            }

            let mut issubform = false;
            let ttype = f.kind.type_name();
            let mut t = String::from("<li>\n");
            t.push_str(&render_label(&idpfx, fname, &label, ttype));

            match &f.kind {
                FieldKind::Text
                | FieldKind::Tel
                | FieldKind::Email
                | FieldKind::Password
                | FieldKind::Textarea
                | FieldKind::Submit => {
                    let val = if f.kind == FieldKind::Submit {
                        label.clone()
                    } else {
                        f.value.as_string()
                    };
                    if val.is_empty() && f.omit_empty {
                        t.clear();
                    } else {
                        t.push_str(&render_string(
                            &kvs, &val, &idpfx, fname, ttype, &opts, &f.min, &f.max, allowedit, masknum, cfg,
                        ));
                    }
                }

                FieldKind::Bool => {
                    let val = match &f.value {
                        FieldValue::Bool(b) => *b,
                        other => is_true(&other.as_string()),
                    };
                    t.push_str(&render_bool(val, fname, &idpfx, &opts, allowedit));
                }

                FieldKind::Note | FieldKind::WideNote => {
                    let mut val = text(&keyval(&kvs, &f.value.as_string()));
                    if val.is_empty() {
                        val = f.content.clone();
                    }
                    if val.is_empty() && f.omit_empty {
                        t.clear();
                    } else {
                        if f.kind == FieldKind::WideNote {
                            t = String::from("<li>");
                        }
                        t.push_str(&format!("<span id=\"{}{}\"{}>{}</span>\n", idpfx, fname, opts, val));
                    }
                }

                FieldKind::File { .. } => {
                    if allowedit {
                        t.push_str(&format!(
                            "<input type=\"file\" id=\"{}{}\" name=\"{}\"{} />\n",
                            idpfx, fname, fname, opts
                        ));
                        out.multipart = true;
                    } else {
                        t.clear();
                    }
                }

                FieldKind::Number | FieldKind::Range => {
                    let val = f.value.as_string();
                    t.push_str(&render_number(
                        &kvs, &val, &idpfx, fname, ttype, &opts, &f.min, &f.max, allowedit, masknum, cfg,
                    ));
                    hint = merge_hint(&hint, &minmax);
                }

                FieldKind::DateTime => {
                    let val = match &f.value {
                        FieldValue::Time(t) => t.format("%Y-%m-%dT%H:%M").to_string(),
                        other => other.as_string(),
                    };
                    t.push_str(&format!(
                        "<input id=\"{}{}\" name=\"{}\" type=\"datetime-local\" value=\"{}\"{} />\n",
                        idpfx,
                        fname,
                        fname,
                        attr(&val),
                        opts
                    ));
                }

                FieldKind::Map { checkbox } => {
                    let selected: KeyVals = match &f.value {
                        FieldValue::Map(m) => m.clone(),
                        _ => Vec::new(),
                    };
                    t.push_str(&render_map(&kvs, &selected, &idpfx, fname, &opts, *checkbox));
                }

                FieldKind::Slice { numeric } => {
                    issubform = true;
                    t = format!("<div class=\"styled_form\">\n{}", t);

                    let (rmb_pre, rmb_post) = if allowedit {
                        (
                            form_head(self.ctx, false),
                            format!("{}{}", render_submit("Remove", "deny"), form_tail()),
                        )
                    } else {
                        (String::new(), String::new())
                    };

                    let ro_opts = if opts.contains(READONLY) {
                        opts.clone()
                    } else {
                        format!("{}{}", opts, READONLY)
                    };

                    let items = match &f.value {
                        FieldValue::List(l) => l.clone(),
                        FieldValue::Empty => Vec::new(),
                        other => vec![other.as_string()],
                    };

                    t.push_str("<ul>\n");
                    for (k, item) in items.iter().enumerate() {
                        let masknumber = if masknum > 0 { masknum + k } else { 0 };
                        t.push_str("<li>");
                        t.push_str(&rmb_pre);
                        if *numeric {
                            t.push_str(&render_number(
                                &kvs, item, &idpfx, fname, "number", &ro_opts, &f.min, &f.max, false, masknumber, cfg,
                            ));
                        } else {
                            t.push_str(&render_string(
                                &kvs, item, &idpfx, fname, "string", &ro_opts, &f.min, &f.max, false, masknumber, cfg,
                            ));
                        }
                        t.push_str(&rmb_post);
                        t.push_str("</li>\n\n");
                    }

                    if allowedit {
                        t.push_str("<li>\n");
                        t.push_str(&form_head(self.ctx, false));
                        if *numeric {
                            t.push_str(&render_number(
                                &kvs, "", &idpfx, fname, "number", &opts, &f.min, &f.max, true, masknum, cfg,
                            ));
                        } else {
                            t.push_str(&render_string(
                                &kvs, "", &idpfx, fname, "string", &opts, &f.min, &f.max, true, masknum, cfg,
                            ));
                        }
                        t.push_str(&render_submit("Add", "allow"));
                        t.push_str(&form_tail());
                        t.push_str("</li>\n\n");
                    }

                    t.push_str("</ul>\n</div>\n");
                }

                FieldKind::Hidden | FieldKind::Record(_) | FieldKind::Ignore => {}
            }

            if t.is_empty() {
                continue;
            }

            if !hint.is_empty() {
                t.push_str(&format!("<span class=\"form_hint\">{}</span>\n", text(&hint)));
            }
            t.push_str("</li>\n\n");

            if f.kind == FieldKind::Submit {
                out.buttons.push_str(&t);
            } else {
                if allowedit {
                    out.neditable += 1;
                }
                if issubform {
                    out.subs.push(t);
                } else {
                    out.body.push_str(&t);
                }
            }
        }

        for (fname, val) in hides {
            out.body.push_str(&render_hidden(&idpfx, &fname, &val));
        }

        Ok(out)
    }
}

fn merge_hint(hint: &str, minmax: &str) -> String {
    match (hint.is_empty(), minmax.is_empty()) {
        (_, true) => hint.to_string(),
        (true, false) => minmax.to_string(),
        (false, false) => format!("{} ({})", hint, minmax),
    }
}

/// Pretty value for `val` when a key/value list knows it.
fn keyval(kvs: &KeyVals, val: &str) -> String {
    kvs.iter()
        .find(|(k, _)| k == val)
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| val.to_string())
}

fn form_head(ctx: &RequestContext, multipart: bool) -> String {
    let mut o = String::from("<form class=\"styled_form\" method=\"post\"");
    if multipart {
        o.push_str(" enctype=\"multipart/form-data\"");
    }
    o.push_str(">\n<fieldset>\n");
    o.push_str(&ctx.csrf_input(""));
    o.push_str("<ul>\n");
    o
}

fn form_tail() -> String {
    "</ul>\n</fieldset>\n</form>\n".to_string()
}

fn render_select(kvs: &KeyVals, def: &str, idpfx: &str, fname: &str, opts: &str) -> String {
    let mut t = format!("<select id=\"{}{}\" name=\"{}\"{}>\n", idpfx, fname, fname, opts);
    for (k, v) in kvs {
        let key = attr(k);
        t.push_str(&format!("<option value=\"{}\"", key));
        if def == k {
            t.push_str(" selected");
        }
        t.push_str(&format!(">{}</option>\n", text(v)));
    }
    t.push_str("</select>\n");
    t
}

fn render_hidden(idpfx: &str, fname: &str, val: &str) -> String {
    format!(
        "<input id=\"{}{}\" name=\"{}\" type=\"hidden\" value=\"{}\" />",
        idpfx,
        fname,
        fname,
        attr(val)
    )
}

fn render_mask(masknum: usize, idpfx: &str, fname: &str) -> String {
    if masknum == 0 {
        return String::new();
    }

    let mut id = format!("{}{}.hide", idpfx, fname);
    if masknum != 1 {
        id.push_str(&masknum.to_string());
    }

    format!(
        "<input type=\"checkbox\" id=\"{}\" class=\"hidebox\" />\n\
         <label for=\"{}\" class=\"hidebox fakebutton noselect\"></label>\n\
         <div class=\"hidebox\">\n",
        id, id
    )
}

fn render_mask_tail(masknum: usize) -> &'static str {
    if masknum == 0 {
        ""
    } else {
        "</div>\n"
    }
}

/// A text-like input; a select when editable with several choices.
#[allow(clippy::too_many_arguments)]
fn render_string(
    kvs: &KeyVals,
    val: &str,
    idpfx: &str,
    fname: &str,
    ttype: &str,
    opts: &str,
    min: &str,
    max: &str,
    allowedit: bool,
    masknum: usize,
    cfg: &AppConfig,
) -> String {
    let mut t = String::new();
    let mut fname = fname.to_string();

    if kvs.len() > 1 {
        if allowedit {
            return render_select(kvs, val, idpfx, &fname, opts);
        }
        t.push_str(&render_hidden(idpfx, &fname, val));
        fname.push_str(".readonly");
    }

    let val = attr(&keyval(kvs, val));

    let ttype = if ttype == "string" && val.contains('\n') {
        "text"
    } else {
        ttype
    };

    t.push_str(&render_mask(masknum, idpfx, &fname));

    if ttype == "text" {
        t.push_str(&format!(
            "<textarea id=\"{}{}\" name=\"{}\"{}>{}</textarea>\n",
            idpfx, fname, fname, opts, val
        ));
        t.push_str(render_mask_tail(masknum));
        return t;
    }

    let input_type = if ttype == "string" { "text" } else { ttype };
    t.push_str(&format!(
        "<input id=\"{}{}\" name=\"{}\" type=\"{}\" value=\"{}\"{}",
        idpfx, fname, fname, input_type, val, opts
    ));

    if !min.is_empty() || !max.is_empty() {
        let min = if min.is_empty() { "0" } else { cfg.resolve_slot(min) };
        let max = cfg.resolve_slot(max);
        t.push_str(&format!(" pattern=\".{{{},{}}}\"", min, max));
    }

    t.push_str(" />\n");
    t.push_str(render_mask_tail(masknum));
    t
}

#[allow(clippy::too_many_arguments)]
fn render_number(
    kvs: &KeyVals,
    val: &str,
    idpfx: &str,
    fname: &str,
    ttype: &str,
    opts: &str,
    min: &str,
    max: &str,
    allowedit: bool,
    masknum: usize,
    cfg: &AppConfig,
) -> String {
    let mut t = String::new();
    let mut fname = fname.to_string();

    if kvs.len() > 1 {
        if allowedit {
            return render_select(kvs, val, idpfx, &fname, opts);
        }
        t.push_str(&render_hidden(idpfx, &fname, val));
        fname.push_str(".readonly");
    }

    let val = attr(&keyval(kvs, val));
    let ttype = if kvs.len() > 1 {
        "text"
    } else if ttype != "range" {
        "number"
    } else {
        ttype
    };

    let min = if min.is_empty() { "0" } else { cfg.resolve_slot(min) };
    let mut bounds = format!(" min=\"{}\"", attr(min));
    if !max.is_empty() {
        bounds.push_str(&format!(" max=\"{}\"", attr(cfg.resolve_slot(max))));
    }

    t.push_str(&render_mask(masknum, idpfx, &fname));
    t.push_str(&format!(
        "<input id=\"{}{}\" name=\"{}\" type=\"{}\" value=\"{}\"{}{} />\n",
        idpfx, fname, fname, ttype, val, bounds, opts
    ));
    t.push_str(render_mask_tail(masknum));
    t
}

/// A checkbox. Read-only checkboxes are disabled, so a hidden companion
/// carries the value on submission.
fn render_bool(val: bool, fname: &str, idpfx: &str, opts: &str, allowedit: bool) -> String {
    let checked = if val { " checked=\"checked\"" } else { "" };

    if allowedit {
        return format!(
            "<input name=\"{}\" id=\"{}{}\" type=\"checkbox\"{}{} />\n",
            fname, idpfx, fname, checked, opts
        );
    }

    format!(
        "<input type=\"checkbox\"{} disabled=\"disabled\"{} />\n\
         <input name=\"{}\" id=\"{}{}\" type=\"hidden\" value=\"{}\" />\n",
        checked,
        opts,
        fname,
        idpfx,
        fname,
        if val { "on" } else { "off" }
    )
}

fn render_map(kvs: &KeyVals, selected: &KeyVals, idpfx: &str, fname: &str, opts: &str, checkbox: bool) -> String {
    if checkbox {
        let mut t = String::from("<ul>\n");
        for (k, v) in kvs {
            let checked = if selected.iter().any(|(s, _)| s == k) {
                " checked=\"checked\""
            } else {
                ""
            };
            t.push_str(&format!(
                "<li>\n<input name=\"{}[]\" id=\"{}{}\" type=\"checkbox\" value=\"{}\"{}{} /> {}</li>\n",
                fname,
                idpfx,
                fname,
                attr(k),
                checked,
                opts,
                text(v)
            ));
        }
        t.push_str("</ul>\n");
        return t;
    }

    let mut t = format!("<select id=\"{}{}\" name=\"{}\" multiple{}>\n", idpfx, fname, fname, opts);
    for (k, v) in selected {
        t.push_str(&format!("<option value=\"{}\" selected>{}</option>\n", attr(k), text(v)));
    }
    for (k, v) in kvs {
        if selected.iter().any(|(s, _)| s == k) {
            continue;
        }
        t.push_str(&format!("<option value=\"{}\">{}</option>\n", attr(k), text(v)));
    }
    t.push_str("</select>\n");
    t
}

fn render_submit(val: &str, class: &str) -> String {
    let mut t = format!("<input id=\"submit\" name=\"submit\" type=\"submit\" value=\"{}\"", attr(val));
    if !class.is_empty() {
        t.push_str(&format!(" class=\"{}\"", class));
    }
    t.push_str(" />\n");
    t
}

fn render_label(idpfx: &str, fname: &str, label: &str, ttype: &str) -> String {
    let mut t = format!("<label for=\"{}{}\">", idpfx, fname);
    if !label.is_empty() && !matches!(ttype, "submit" | "note" | "widenote") {
        t.push_str(&text(label));
        if !label.ends_with('?') {
            t.push(':');
        }
    } else {
        t.push_str("&nbsp;");
    }
    t.push_str("</label>\n");
    t
}
