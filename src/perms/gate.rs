use std::sync::Arc;

use thiserror::Error;

use super::Perm;
use crate::config::FeatureConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PermDenied(pub String);

impl PermDenied {
    fn new(msg: &str) -> Self {
        PermDenied(msg.to_string())
    }
}

/// The user a handler selected (e.g. `/user/<name>/`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectedUser {
    pub username: String,
    /// The selected user shares at least one group with the caller.
    pub shares_group: bool,
}

/// The group a handler selected, seen from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectedGroup {
    pub name: String,
    pub member: bool,
    pub admin: bool,
    pub has_wiki: bool,
    pub has_file: bool,
    pub has_calendar: bool,
}

/// Everything the gate needs to know about who is asking.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub username: Option<String>,
    /// System-admin bit after the source address restriction.
    pub sysadmin: bool,
    pub can_be_sysadmin: bool,
    pub loopback: bool,
    pub bearer_auth: bool,
    pub selected_user: Option<SelectedUser>,
    pub selected_group: Option<SelectedGroup>,
}

impl Caller {
    pub fn logged_in(&self) -> bool {
        self.username.is_some()
    }

    fn selected_self(&self) -> bool {
        match (&self.username, &self.selected_user) {
            (Some(me), Some(sel)) => *me == sel.username,
            _ => false,
        }
    }

    fn group_member(&self) -> bool {
        self.selected_group.as_ref().map(|g| g.member).unwrap_or(false)
    }
}

/// Application hook consulted before the default deny. `Some` is a final
/// decision; `None` leaves the gate's own verdict in place.
pub type AppPermHook =
    Arc<dyn Fn(&Caller, &str, Perm) -> Option<Result<(), PermDenied>> + Send + Sync>;

/// Evaluate `perms` for `caller`. Bits are tried from least to most
/// privileged and any bit that admits the caller wins; the error returned
/// on denial is the one from the last bit that was tried.
pub fn check_perms(
    caller: &Caller,
    features: &FeatureConfig,
    hook: Option<&AppPermHook>,
    what: &str,
    perms: Perm,
) -> Result<(), PermDenied> {
    let perms = perms.audience();
    let mut err: Option<PermDenied> = None;

    tracing::trace!(what, perms = %perms, user = ?caller.username, "check_perms");

    if perms.contains(Perm::NOBODY) {
        return Err(PermDenied::new("Nobody is allowed"));
    }

    if perms.is_empty() {
        return Ok(());
    }

    if perms.contains(Perm::CLI) {
        if caller.logged_in() && features.cli_enabled {
            return Ok(());
        }
        err = Some(PermDenied::new("CLI is not enabled"));
    }

    if perms.contains(Perm::API) {
        if features.api_enabled && caller.bearer_auth {
            return Ok(());
        }
        err = Some(PermDenied::new(if features.api_enabled {
            "API requires bearer authentication"
        } else {
            "API is not enabled"
        }));
    }

    if perms.contains(Perm::OAUTH) {
        if features.oauth_enabled {
            return Ok(());
        }
        err = Some(PermDenied::new("OAuth is not enabled"));
    }

    if perms.contains(Perm::LOOPBACK) {
        if caller.loopback {
            return Ok(());
        }
        err = Some(PermDenied::new("Not a Loopback"));
    }

    if perms.contains(Perm::GUEST) {
        if !caller.logged_in() {
            return Ok(());
        }
        return Err(PermDenied::new("Must not be authenticated"));
    }

    if perms.contains(Perm::USER_SELF) {
        if !caller.logged_in() {
            err = Some(PermDenied::new("Not Authenticated"));
        } else if caller.selected_user.is_none() {
            err = Some(PermDenied::new("No user selected"));
        } else if caller.selected_self() {
            return Ok(());
        } else {
            err = Some(PermDenied::new("Different user selected"));
        }
    }

    if perms.contains(Perm::USER_VIEW) {
        match (&caller.username, &caller.selected_user) {
            (None, _) => err = Some(PermDenied::new("Not Authenticated")),
            (Some(_), None) => err = Some(PermDenied::new("No user selected")),
            (Some(me), Some(sel)) => {
                if *me == sel.username || sel.shares_group {
                    return Ok(());
                }
                err = Some(PermDenied::new("Different user selected"));
            }
        }
    }

    let group_features: [(Perm, fn(&SelectedGroup) -> bool, &str); 3] = [
        (Perm::GROUP_WIKI, |g: &SelectedGroup| g.has_wiki, "Group does not have a Wiki"),
        (Perm::GROUP_FILE, |g: &SelectedGroup| g.has_file, "Group does not have a File"),
        (Perm::GROUP_CALENDAR, |g: &SelectedGroup| g.has_calendar, "Group does not have a Calendar"),
    ];
    for (bit, enabled, missing) in group_features {
        if !perms.contains(bit) {
            continue;
        }
        let has = caller.selected_group.as_ref().map(enabled).unwrap_or(false);
        if !has {
            return Err(PermDenied::new(missing));
        }
        if caller.group_member() {
            return Ok(());
        }
        err = Some(PermDenied::new("Not a group member"));
    }

    if perms.contains(Perm::NONE) {
        return Ok(());
    }

    // Everything below requires a login
    if !caller.logged_in() {
        return Err(PermDenied::new("Not authenticated"));
    }

    if caller.sysadmin {
        return Ok(());
    }
    err = Some(PermDenied::new("Not a SysAdmin"));

    if perms.contains(Perm::USER) {
        return Ok(());
    }

    if perms.contains(Perm::GROUP_ADMIN) {
        if caller.selected_group.as_ref().map(|g| g.admin).unwrap_or(false) {
            return Ok(());
        }
        err = Some(PermDenied::new("Not a group admin"));
    }

    if perms.contains(Perm::GROUP_MEMBER) {
        if caller.group_member() {
            return Ok(());
        }
        err = Some(PermDenied::new("Not a group member"));
    }

    if perms.contains(Perm::USER_NOMINATE) {
        if caller.selected_user.is_some() {
            return Ok(());
        }
        err = Some(PermDenied::new("No user selected"));
    }

    if perms.contains(Perm::SYS_ADMIN_CAN) {
        if caller.can_be_sysadmin {
            return Ok(());
        }
        err = Some(PermDenied::new("Can't become SysAdmin"));
    }

    if let Some(hook) = hook {
        if let Some(decision) = hook(caller, what, perms) {
            return decision;
        }
    }

    Err(err.unwrap_or_else(|| PermDenied::new("Permission denied")))
}
