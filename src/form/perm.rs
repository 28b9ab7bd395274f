//! Per-field read/edit permission evaluation.

use super::{Field, FormError, Mode, Record};
use crate::context::RequestContext;
use crate::perms::Perm;

fn check_tag(ctx: &RequestContext, field: &Field, tag: &str, permstr: &str) -> Result<bool, FormError> {
    let perms: Perm = permstr
        .parse()
        .map_err(|e: crate::perms::UnknownPerm| FormError::Permission(e.to_string()))?;

    let what = format!("FieldPermCheck({}/{}/{})", field.name, tag, permstr);
    Ok(ctx.check_perms(&what, perms).is_ok())
}

/// Decide whether `field` is shown and whether it may be edited.
///
/// `trail` lists the enclosing records, innermost first; the first one with
/// a permission hook answers before the field's own tags are consulted.
/// An edit denial falls back to the read tags.
pub fn field_access(
    ctx: &RequestContext,
    mode: Mode,
    trail: &[&Record],
    field: &Field,
) -> Result<(bool, bool), FormError> {
    let mut allowedit = mode == Mode::Update;
    let mut ok = true;

    let hook = trail.iter().find_map(|r| r.perm_check.as_ref());
    if let Some(hook) = hook {
        let (mut vis, mut edit) = hook(ctx, mode, field).map_err(FormError::Permission)?;
        if !vis && edit {
            let retry = hook(ctx, Mode::Read, field).map_err(FormError::Permission)?;
            vis = retry.0;
            edit = retry.1;
        }
        if !vis {
            return Ok((false, edit));
        }
        ok = vis;
        allowedit = edit;
    }

    let (tag, permstr) = if allowedit {
        ("set", field.set_perms.as_str())
    } else {
        ("get", field.get_perms.as_str())
    };

    if hook.is_none() || !permstr.is_empty() {
        ok = match check_tag(ctx, field, tag, permstr) {
            Ok(v) => v,
            Err(e) if allowedit && !field.get_perms.is_empty() => {
                tracing::debug!("Field {} edit tags unusable: {}", field.name, e);
                false
            }
            Err(e) => return Err(e),
        };

        if !ok && allowedit {
            allowedit = false;
            ok = check_tag(ctx, field, "get", &field.get_perms)?;
        }
    }

    Ok((ok, allowedit))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::form::FieldKind;
    use crate::testing::{login_as, test_context, test_portal};

    #[test]
    fn test_untagged_field_follows_mode() {
        let portal = test_portal();
        let ctx = test_context(&portal, "GET", "/");
        let rec = Record::new("r");
        let f = Field::text("name", "Name");
        assert_eq!(field_access(&ctx, Mode::Update, &[&rec], &f).unwrap(), (true, true));
        assert_eq!(field_access(&ctx, Mode::Read, &[&rec], &f).unwrap(), (true, false));
    }

    #[test]
    fn test_edit_denied_falls_back_to_read() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/");
        login_as(&mut ctx, "alice");
        let rec = Record::new("r");
        let f = Field::text("name", "Name").perms("user", "sysadmin");
        assert_eq!(field_access(&ctx, Mode::Update, &[&rec], &f).unwrap(), (true, false));

        let hidden = Field::text("secret", "Secret").perms("sysadmin", "sysadmin");
        assert_eq!(field_access(&ctx, Mode::Update, &[&rec], &hidden).unwrap(), (false, false));
    }

    #[test]
    fn test_bad_tag_is_an_error() {
        let portal = test_portal();
        let ctx = test_context(&portal, "GET", "/");
        let rec = Record::new("r");
        let f = Field::text("name", "Name").perms("wizard", "");
        let err = field_access(&ctx, Mode::Read, &[&rec], &f).unwrap_err();
        assert_eq!(err, FormError::Permission("Unknown permission: 'wizard'".to_string()));
    }

    #[test]
    fn test_record_hook_decides_first() {
        let portal = test_portal();
        let ctx = test_context(&portal, "GET", "/");
        let rec = Record::new("r").with_perm_check(Arc::new(|_, mode, field| {
            if field.name == "locked" {
                return Ok((mode == Mode::Read, false));
            }
            Ok((true, mode == Mode::Update))
        }));
        let locked = Field::new("locked", "Locked", FieldKind::Bool);
        assert_eq!(field_access(&ctx, Mode::Update, &[&rec], &locked).unwrap(), (false, false));

        let open = Field::text("open", "Open");
        assert_eq!(field_access(&ctx, Mode::Update, &[&rec], &open).unwrap(), (true, true));
    }
}
