//! Binding form submissions onto commands.

use tracing::{debug, error};

use super::{field_access, normalize_bool, is_true, Field, FieldKind, FormError, FormStatus, ImageSize, Mode, Record};
use crate::context::RequestContext;

/// Result of a record submission: the update summary plus the last command
/// error, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub message: String,
    pub error: Option<FormError>,
}

impl Submission {
    fn failed(err: FormError) -> Self {
        Self {
            message: String::new(),
            error: Some(err),
        }
    }

    pub fn status(&self) -> FormStatus {
        FormStatus {
            message: self.message.clone(),
            error: self.error.as_ref().map(ToString::to_string).unwrap_or_default(),
        }
    }
}

/// Fields a submission can carry, with nested records flattened.
fn bindable<'r>(ctx: &RequestContext, outer: &[&'r Record], rec: &'r Record, out: &mut Vec<&'r Field>) {
    let mut trail: Vec<&Record> = Vec::with_capacity(outer.len() + 1);
    trail.push(rec);
    trail.extend_from_slice(outer);

    for f in &rec.fields {
        match &f.kind {
            FieldKind::Ignore | FieldKind::Submit | FieldKind::Note | FieldKind::WideNote => continue,
            FieldKind::Record(nested) => {
                bindable(ctx, &trail, nested, out);
                continue;
            }
            _ => {}
        }

        if !f.form_edit {
            continue;
        }

        match field_access(ctx, Mode::Update, &trail, f) {
            Ok((true, true)) => out.push(f),
            Ok(_) => {}
            Err(e) => debug!("HandleForm: field {} skipped: {}", f.name, e),
        }
    }
}

fn mask_arg(name: &str, val: &str) -> String {
    match name {
        "password" | "twofactor" | "keyring" => {
            if val.is_empty() {
                format!("({} not given)", name)
            } else {
                format!("*{}*", name)
            }
        }
        _ => val.to_string(),
    }
}

impl RequestContext {
    pub async fn handle_form(&mut self, cmd: &str, args: &[String], record: &Record) -> Submission {
        self.handle_form_s(cmd, false, args, record).await
    }

    /// Apply a POSTed `record` by running `<cmd> [op] <field> <args..> <value>`
    /// for every editable field.
    ///
    /// With `autoop` the operation follows the pressed button: `Add` and
    /// `Remove` act on slice fields only, anything else sets plain fields.
    pub async fn handle_form_s(&mut self, cmd: &str, autoop: bool, args: &[String], record: &Record) -> Submission {
        if self.is_get() {
            return Submission::default();
        }

        debug!("HandleForm({})", cmd);

        if !self.is_post() {
            debug!("HandleForm() - Only POST");
            return Submission::failed(FormError::OnlyPost);
        }

        if !self.check_csrf().await {
            return Submission::failed(FormError::Expired);
        }

        let mut cmd = cmd.to_string();
        let op = if autoop {
            let btn = self.form_value("submit").await.unwrap_or_default().to_lowercase();
            let op = match btn.as_str() {
                "" => return Submission::failed(FormError::NoButton),
                "add" => "add",
                "remove" => "remove",
                _ => "set",
            };
            cmd.push(' ');
            cmd.push_str(op);
            op
        } else {
            "set"
        };

        let mut fields = Vec::new();
        bindable(self, &[], record, &mut fields);

        let mut updates = 0;
        let mut nomods = 0;
        let mut last_err = None;

        for f in fields {
            let key = f.name.as_str();
            let is_slice = matches!(f.kind, FieldKind::Slice { .. });

            let val = match &f.kind {
                FieldKind::Bool => match self.form_value(key).await {
                    Ok(v) if !v.is_empty() => normalize_bool(&v).to_string(),
                    Ok(_) | Err(FormError::MissingValue) => normalize_bool("off").to_string(),
                    Err(_) => continue,
                },
                FieldKind::File { max_image, b64 } => match self.form_file(key, *max_image, *b64).await {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    Err(_) => continue,
                },
                _ => match self.form_value(key).await {
                    Ok(v) => v.trim().to_string(),
                    Err(_) => continue,
                },
            };

            if op == "set" && is_slice {
                continue;
            }
            if op != "set" && (!is_slice || val.is_empty()) {
                continue;
            }

            let mut cmds: Vec<String> = cmd.split(' ').map(str::to_string).collect();
            cmds.push(key.to_string());
            cmds.extend_from_slice(args);
            cmds.push(val);

            match self.cmd(&cmds).await {
                Ok(out) => {
                    if out.split(' ').next() == Some("Updated") {
                        updates += 1;
                    } else {
                        nomods += 1;
                    }
                }
                Err(e) if e.is_unknown_command() => continue,
                Err(e) => {
                    error!("HandleForm({:?}) - Cmd - err: {}", cmds, e);
                    last_err = Some(FormError::Command(e));
                }
            }
        }

        let mut msg = String::new();
        if updates > 0 {
            msg = format!("Updated {} fields", updates);
        }
        if nomods > 0 {
            if !msg.is_empty() {
                msg.push_str(", ");
            }
            msg.push_str(&format!("{} fields were not modified", nomods));
        }
        if msg.is_empty() {
            msg = "No fields were modified".to_string();
        }

        Submission {
            message: msg,
            error: last_err,
        }
    }

    /// Run a fixed command line, filling empty positional `args` from the
    /// form by the command's argument names.
    pub async fn handle_cmd(&mut self, cmd: &str, args: &[String]) -> Result<String, FormError> {
        if self.is_get() {
            return Ok(String::new());
        }

        if !self.is_post() {
            return Err(FormError::OnlyPost);
        }

        if !self.check_csrf().await {
            return Err(FormError::InvalidHtmlForm);
        }

        let mut args = args.to_vec();
        let mut vargs = args.clone();

        let mut cmds: Vec<String> = cmd.split(' ').map(str::to_string).collect();
        cmds.extend_from_slice(&args);

        let spec = self.walk_menu(&cmds).map_err(|e| {
            error!("WalkMenu({:?}) failed: {}", cmds, e);
            FormError::Command(e)
        })?;

        for (n, argspec) in spec.args.iter().enumerate() {
            if n >= args.len() {
                if n >= spec.args_min {
                    break;
                }
                error!(
                    "HandleCmd({}) missing variable room for argument (args:{})",
                    cmd,
                    args.len()
                );
                return Err(FormError::InvalidArgument);
            }

            if !args[n].is_empty() {
                continue;
            }

            let opt: Vec<&str> = argspec.split('#').collect();
            let name = opt[0];

            let val = if opt.get(1) == Some(&"file") {
                let max_image = opt.get(2).and_then(|m| ImageSize::parse(m));
                let b64 = opt.get(3).map(|b| is_true(b)).unwrap_or(false);
                let bytes = self.form_file(name, max_image, b64).await?;
                String::from_utf8_lossy(&bytes).into_owned()
            } else {
                self.form_value(name).await?
            };

            vargs[n] = mask_arg(name, &val);
            debug!("Arg {} = {}", name, vargs[n]);
            args[n] = val;
        }

        let mut cmds: Vec<String> = cmd.split(' ').map(str::to_string).collect();
        cmds.extend(args);
        debug!("HandleCmd() - exec: {:?}", vargs);

        let msg = self.cmd(&cmds).await?;
        debug!("HandleCmd() - done");
        Ok(msg)
    }
}
