pub mod gate;

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};
use std::str::FromStr;

use thiserror::Error;

pub use gate::{check_perms, AppPermHook, Caller, PermDenied, SelectedGroup, SelectedUser};

/// Permission bitset. Audience bits say who may invoke something; the
/// modifier bits (`HIDDEN`, `NOCRUMB`, `NOSUBS`) only steer menu
/// resolution and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Perm(u64);

impl Perm {
    pub const NOTHING: Perm = Perm(0);
    pub const NONE: Perm = Perm(1 << 0);
    pub const GUEST: Perm = Perm(1 << 1);
    pub const USER: Perm = Perm(1 << 2);
    pub const USER_SELF: Perm = Perm(1 << 3);
    pub const USER_NOMINATE: Perm = Perm(1 << 4);
    pub const USER_VIEW: Perm = Perm(1 << 5);
    pub const GROUP_MEMBER: Perm = Perm(1 << 6);
    pub const GROUP_ADMIN: Perm = Perm(1 << 7);
    pub const GROUP_WIKI: Perm = Perm(1 << 8);
    pub const GROUP_FILE: Perm = Perm(1 << 9);
    pub const GROUP_CALENDAR: Perm = Perm(1 << 10);
    pub const SYS_ADMIN: Perm = Perm(1 << 11);
    pub const SYS_ADMIN_CAN: Perm = Perm(1 << 12);
    pub const CLI: Perm = Perm(1 << 13);
    pub const API: Perm = Perm(1 << 14);
    pub const OAUTH: Perm = Perm(1 << 15);
    pub const LOOPBACK: Perm = Perm(1 << 16);
    pub const HIDDEN: Perm = Perm(1 << 17);
    pub const NOCRUMB: Perm = Perm(1 << 18);
    pub const NOSUBS: Perm = Perm(1 << 19);
    pub const NOBODY: Perm = Perm(1 << 20);

    /// First application-defined bit; `app(0)` .. `app(9)`.
    const APP_SHIFT: u32 = 21;
    const APP_COUNT: u32 = 10;

    pub const MODIFIERS: Perm = Perm(Self::HIDDEN.0 | Self::NOCRUMB.0 | Self::NOSUBS.0);

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn app(n: u32) -> Perm {
        assert!(n < Self::APP_COUNT);
        Perm(1 << (Self::APP_SHIFT + n))
    }

    pub const fn contains(self, other: Perm) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn intersects(self, other: Perm) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The bits that select an audience, without rendering modifiers.
    pub const fn audience(self) -> Perm {
        Perm(self.0 & !Self::MODIFIERS.0)
    }

    pub const fn without(self, other: Perm) -> Perm {
        Perm(self.0 & !other.0)
    }

    fn names() -> impl Iterator<Item = (Perm, String)> {
        const FIXED: [&str; 21] = [
            "none",
            "guest",
            "user",
            "self",
            "user_nominate",
            "user_view",
            "group_member",
            "group_admin",
            "group_wiki",
            "group_file",
            "group_calendar",
            "sysadmin",
            "sysadmin_can",
            "cli",
            "api",
            "oauth",
            "loopback",
            "hidden",
            "nocrumb",
            "nosubs",
            "nobody",
        ];
        FIXED
            .iter()
            .enumerate()
            .map(|(i, n)| (Perm(1 << i), n.to_string()))
            .chain((0..Self::APP_COUNT).map(|i| (Perm::app(i), format!("app_{}", i))))
    }
}

impl BitOr for Perm {
    type Output = Perm;

    fn bitor(self, rhs: Perm) -> Perm {
        Perm(self.0 | rhs.0)
    }
}

impl BitOrAssign for Perm {
    fn bitor_assign(&mut self, rhs: Perm) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Perm {
    type Output = Perm;

    fn bitand(self, rhs: Perm) -> Perm {
        Perm(self.0 & rhs.0)
    }
}

impl Not for Perm {
    type Output = Perm;

    fn not(self) -> Perm {
        Perm(!self.0)
    }
}

impl fmt::Display for Perm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "nothing");
        }
        let names: Vec<String> = Perm::names()
            .filter(|(p, _)| self.contains(*p))
            .map(|(_, n)| n)
            .collect();
        write!(f, "{}", names.join(","))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown permission: '{0}'")]
pub struct UnknownPerm(pub String);

impl FromStr for Perm {
    type Err = UnknownPerm;

    /// Comma separated, case-insensitive: `"user,group_admin"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut perm = Perm::NOTHING;
        for part in s.split(',').map(|p| p.trim().to_ascii_lowercase()) {
            if part.is_empty() || part == "nothing" {
                continue;
            }
            let (bit, _) = Perm::names()
                .find(|(_, n)| *n == part)
                .ok_or_else(|| UnknownPerm(part.clone()))?;
            perm |= bit;
        }
        Ok(perm)
    }
}
