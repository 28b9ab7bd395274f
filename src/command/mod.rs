//! Command dispatch.
//!
//! Every state change a form makes ends up as a command line such as
//! `system login alice secret ""`. The [`CommandDispatcher`] trait is the
//! seam; [`CommandTree`] is the built-in implementation.

mod system;

use async_trait::async_trait;
use axum::http::StatusCode;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::info;

use crate::context::RequestContext;
use crate::perms::Perm;

pub use system::builtin_tree;

/// Prefix of the unknown-command error text.
pub const UNKNOWN_COMMAND_PREFIX: &str = "Unknown command: ";

/// Split a command line on whitespace. Single or double quotes group
/// words; the other quote character inside a group is kept as is.
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut cur = String::new();
    let mut quote: Option<char> = None;
    let mut started = false;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => cur.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                started = true;
            }
            None if c.is_whitespace() => {
                if started {
                    args.push(std::mem::take(&mut cur));
                    started = false;
                }
            }
            None => {
                cur.push(c);
                started = true;
            }
        }
    }

    if started {
        args.push(cur);
    }

    args
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CmdError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Denied(String),

    #[error("{0}")]
    Failed(String),
}

impl CmdError {
    pub fn is_unknown_command(&self) -> bool {
        matches!(self, CmdError::UnknownCommand(_))
    }
}

/// The argument description of a leaf command, as returned by a menu walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdSpec {
    pub args_min: usize,
    /// `None` for any number of arguments.
    pub args_max: Option<usize>,
    /// Argument names; `#`-separated options follow the name
    /// (`avatar#file#65536#base64`, `password#password`).
    pub args: Vec<String>,
    pub desc: String,
}

#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Run `argv`, returning the command output.
    async fn cmd(&self, ctx: &mut RequestContext, argv: &[String]) -> Result<String, CmdError>;

    /// Resolve `argv` to a leaf command without running it.
    fn walk_menu(&self, ctx: &RequestContext, argv: &[String]) -> Result<CmdSpec, CmdError>;
}

pub type CmdFn =
    for<'a> fn(&'a mut RequestContext, &'a [String]) -> BoxFuture<'a, Result<String, CmdError>>;

pub enum CmdAction {
    Run(CmdFn),
    Menu(Vec<CmdEntry>),
}

pub struct CmdEntry {
    pub cmd: String,
    pub action: CmdAction,
    pub spec: CmdSpec,
    pub perms: Perm,
}

impl CmdEntry {
    pub fn run(cmd: &str, f: CmdFn, args_min: usize, args_max: usize, args: &[&str], perms: Perm, desc: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            action: CmdAction::Run(f),
            spec: CmdSpec {
                args_min,
                args_max: Some(args_max),
                args: args.iter().map(|a| a.to_string()).collect(),
                desc: desc.to_string(),
            },
            perms,
        }
    }

    pub fn menu(cmd: &str, subs: Vec<CmdEntry>, perms: Perm, desc: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            action: CmdAction::Menu(subs),
            spec: CmdSpec {
                args_min: 0,
                args_max: None,
                args: Vec::new(),
                desc: desc.to_string(),
            },
            perms,
        }
    }
}

enum Resolved<'t> {
    Help { loc: String, entries: &'t [CmdEntry] },
    Leaf { loc: String, entry: &'t CmdEntry, args: Vec<String> },
}

/// A static tree of commands. Sub-menus provide their own `help`.
pub struct CommandTree {
    app_name: String,
    root: Vec<CmdEntry>,
}

impl CommandTree {
    pub fn new(app_name: &str, root: Vec<CmdEntry>) -> Self {
        Self {
            app_name: app_name.to_string(),
            root,
        }
    }

    pub fn add(&mut self, entry: CmdEntry) {
        self.root.push(entry);
    }

    fn resolve<'t>(&'t self, ctx: &RequestContext, argv: &[String]) -> Result<Resolved<'t>, CmdError> {
        let mut entries: &'t [CmdEntry] = &self.root;
        let mut loc = String::new();
        let mut rest = argv;

        loop {
            let arg = match rest.first() {
                Some(a) if !a.is_empty() => a.to_lowercase(),
                _ => "help".to_string(),
            };

            if arg == "help" {
                return Ok(Resolved::Help { loc, entries });
            }

            let Some(entry) = entries.iter().find(|e| e.cmd == arg) else {
                let name = if loc.is_empty() { arg } else { format!("{} {}", loc, arg) };
                return Err(CmdError::UnknownCommand(name));
            };

            if !loc.is_empty() {
                loc.push(' ');
            }
            loc.push_str(&arg);

            if let Err(err) = ctx.check_perms(&format!("Menu({})", entry.cmd), entry.perms) {
                let user = ctx.username().unwrap_or("<<notloggedin>>");
                info!("User {} tried access to command '{}': {}", user, loc, err);
                return Err(CmdError::Denied(err.0));
            }

            rest = &rest[1..];

            match &entry.action {
                CmdAction::Menu(subs) => entries = subs,
                CmdAction::Run(_) => {
                    return Ok(Resolved::Leaf {
                        loc,
                        entry,
                        args: rest.to_vec(),
                    })
                }
            }
        }
    }

    fn help(&self, ctx: &RequestContext, loc: &str, entries: &[CmdEntry]) -> String {
        let mut o = if loc.is_empty() {
            format!("{} Help\n", self.app_name)
        } else {
            format!("{} Help for: \"{}\"\n", self.app_name, loc)
        };

        match ctx.the_user() {
            Some(user) => {
                let ss = if ctx.is_sysadmin() {
                    " [sysadmin]"
                } else if user.can_be_sysadmin {
                    " [NOT sysadmin]"
                } else {
                    ""
                };
                o.push_str(&format!("User: {}{}\n", user.username, ss));
            }
            None => o.push_str("User: [Not authenticated]\n"),
        }
        o.push('\n');

        if loc.is_empty() {
            o.push_str(&format!(
                "Welcome to the {} menu system which is command line interface (CLI) based.\n\
                 Note that when a command is not in the help menu the selected user might not have permissions for it.\n\
                 \n\
                 Each section, items marked [SUB], has its own 'help' command.\n\
                 \n\
                 The following commands are available on the root level:\n",
                self.app_name
            ));
        }

        for e in entries {
            if ctx.check_perms(&format!("Menu({})/help", e.cmd), e.perms).is_err() {
                continue;
            }

            let opts = match e.action {
                CmdAction::Menu(_) => "[SUB]".to_string(),
                CmdAction::Run(_) => e
                    .spec
                    .args
                    .iter()
                    .map(|a| format!("<{}>", a.split('#').next().unwrap_or_default()))
                    .collect::<Vec<_>>()
                    .join(" "),
            };

            o.push_str(&format!(" {:<20} {:<20} {:<20}\n", e.cmd, opts, e.spec.desc));
        }

        o
    }
}

#[async_trait]
impl CommandDispatcher for CommandTree {
    async fn cmd(&self, ctx: &mut RequestContext, argv: &[String]) -> Result<String, CmdError> {
        let resolved = match self.resolve(ctx, argv) {
            Ok(r) => r,
            Err(err @ CmdError::Denied(_)) => {
                ctx.set_status(StatusCode::UNAUTHORIZED);
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let (loc, entry, args) = match resolved {
            Resolved::Help { loc, entries } => return Ok(self.help(ctx, &loc, entries)),
            Resolved::Leaf { loc, entry, args } => (loc, entry, args),
        };

        if args.len() < entry.spec.args_min {
            return Err(CmdError::InvalidArgument(format!(
                "Not enough arguments for '{}' (got {}, need at least {})",
                loc,
                args.len(),
                entry.spec.args_min
            )));
        }

        if let Some(max) = entry.spec.args_max {
            if args.len() > max {
                return Err(CmdError::InvalidArgument(format!(
                    "Too many arguments for '{}' (got {}, but want a maximum of {})",
                    loc,
                    args.len(),
                    max
                )));
            }
        }

        match entry.action {
            CmdAction::Run(f) => f(ctx, &args).await,
            CmdAction::Menu(_) => Ok(String::new()),
        }
    }

    fn walk_menu(&self, ctx: &RequestContext, argv: &[String]) -> Result<CmdSpec, CmdError> {
        match self.resolve(ctx, argv)? {
            Resolved::Leaf { entry, .. } => Ok(entry.spec.clone()),
            Resolved::Help { .. } => Err(CmdError::InvalidArgument(
                "help not allowed during menuwalk".to_string(),
            )),
        }
    }
}

impl RequestContext {
    /// Run a command line through the portal's dispatcher.
    pub async fn cmd(&mut self, argv: &[String]) -> Result<String, CmdError> {
        let commands = std::sync::Arc::clone(&self.portal().commands);
        commands.cmd(self, argv).await
    }

    /// `base` split on spaces, followed by `args`.
    pub async fn cmd_out(&mut self, base: &str, args: &[String]) -> Result<String, CmdError> {
        let mut argv: Vec<String> = base
            .split(' ')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        argv.extend_from_slice(args);
        self.cmd(&argv).await
    }

    pub fn walk_menu(&self, argv: &[String]) -> Result<CmdSpec, CmdError> {
        self.portal().commands.walk_menu(self, argv)
    }
}
