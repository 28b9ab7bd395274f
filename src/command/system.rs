//! Built-in `system` commands.

use std::net::IpAddr;

use futures::future::BoxFuture;

use super::{CmdEntry, CmdError, CommandTree};
use crate::context::RequestContext;
use crate::perms::Perm;

/// The built-in command tree: `help` and the `system` menu.
pub fn builtin_tree(app_name: &str) -> CommandTree {
    let iptrk = vec![
        CmdEntry::run("list", iptrk_list, 0, 0, &[], Perm::SYS_ADMIN, "List the contents of the IPtrk tables"),
        CmdEntry::run("flush", iptrk_flush, 0, 0, &[], Perm::SYS_ADMIN, "Flush all entries from the IPtrk table"),
        CmdEntry::run("remove", iptrk_remove, 1, 1, &["ip"], Perm::SYS_ADMIN, "Remove an entry from IPtrk"),
    ];

    let system = vec![
        CmdEntry::run(
            "login",
            system_login,
            2,
            3,
            &["username", "password#password", "twofactor#twofactor"],
            Perm::NONE,
            "Login",
        ),
        CmdEntry::run("logout", system_logout, 0, 0, &[], Perm::NONE, "Logout"),
        CmdEntry::run("whoami", system_whoami, 0, 0, &[], Perm::NONE, "Who Am I?"),
        CmdEntry::run(
            "swapadmin",
            system_swapadmin,
            0,
            0,
            &[],
            Perm::SYS_ADMIN_CAN,
            "Swap from regular to sysadmin user",
        ),
        CmdEntry::menu("iptrk", iptrk, Perm::SYS_ADMIN, "IPtrk control and information"),
    ];

    CommandTree::new(app_name, vec![CmdEntry::menu("system", system, Perm::NONE, "System commands")])
}

/// args: <username> <password> [twofactor]
fn system_login<'a>(ctx: &'a mut RequestContext, args: &'a [String]) -> BoxFuture<'a, Result<String, CmdError>> {
    Box::pin(async move {
        let twofactor = args.get(2).map(String::as_str).unwrap_or("");
        ctx.login(&args[0], &args[1], twofactor)
            .await
            .map_err(|e| CmdError::Failed(e.to_string()))?;
        Ok("Login successful\n".to_string())
    })
}

fn system_logout<'a>(ctx: &'a mut RequestContext, _args: &'a [String]) -> BoxFuture<'a, Result<String, CmdError>> {
    Box::pin(async move {
        ctx.logout();
        Ok(String::new())
    })
}

fn system_whoami<'a>(ctx: &'a mut RequestContext, _args: &'a [String]) -> BoxFuture<'a, Result<String, CmdError>> {
    Box::pin(async move {
        Ok(match ctx.the_user() {
            Some(user) => format!("Username: {}\nFullname: {}\n", user.username, user.full_name),
            None => "Not authenticated\n".to_string(),
        })
    })
}

fn system_swapadmin<'a>(ctx: &'a mut RequestContext, _args: &'a [String]) -> BoxFuture<'a, Result<String, CmdError>> {
    Box::pin(async move {
        if !ctx.swap_sysadmin() {
            return Err(CmdError::Failed("Swapping failed".to_string()));
        }

        let mode = if ctx.is_sysadmin() { "SysAdmin" } else { "Regular" };
        Ok(format!("Now a {} user\n", mode))
    })
}

fn iptrk_list<'a>(ctx: &'a mut RequestContext, _args: &'a [String]) -> BoxFuture<'a, Result<String, CmdError>> {
    Box::pin(async move {
        let entries = ctx.portal().iptrk.list().await;
        if entries.is_empty() {
            return Ok("There are currently no entries\n".to_string());
        }

        let fmt = ctx.portal().config.ui.time_format.clone();
        let mut o = format!("{:>16} {:>16} {:>7} {:>10} {}\n", "Entered", "Last", "Status", "Count", "IP");
        for e in entries {
            o.push_str(&format!(
                "{:>16} {:>16} {:>7} {:>10} {}\n",
                e.entered.format(&fmt),
                e.last.format(&fmt),
                if e.blocked { "blocked" } else { "okay" },
                e.count,
                e.ip
            ));
        }
        Ok(o)
    })
}

fn iptrk_flush<'a>(ctx: &'a mut RequestContext, _args: &'a [String]) -> BoxFuture<'a, Result<String, CmdError>> {
    Box::pin(async move {
        ctx.portal().iptrk.flush().await;
        Ok("IPtrk flushed\n".to_string())
    })
}

fn iptrk_remove<'a>(ctx: &'a mut RequestContext, args: &'a [String]) -> BoxFuture<'a, Result<String, CmdError>> {
    Box::pin(async move {
        let ip = args[0].trim();
        if ip.is_empty() {
            return Err(CmdError::InvalidArgument(
                "Missing argument, IP address required".to_string(),
            ));
        }

        let ip: IpAddr = ip
            .parse()
            .map_err(|_| CmdError::InvalidArgument(format!("Not a valid IP address: {}", ip)))?;

        Ok(if ctx.portal().iptrk.reset(&ip).await {
            "IP removed from IPtrk table\n".to_string()
        } else {
            "No such IP in IPtrk table\n".to_string()
        })
    })
}

#[cfg(test)]
mod tests {
    use crate::testing::{login_as, login_as_sysadmin, test_context, test_portal};

    fn argv(s: &str) -> Vec<String> {
        s.split(' ').map(str::to_string).collect()
    }

    #[tokio::test]
    async fn test_login_and_whoami() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "POST", "/cli/");
        let out = ctx.cmd(&argv("system login alice wonderland")).await.unwrap();
        assert_eq!(out, "Login successful\n");
        assert!(ctx.is_logged_in());

        let out = ctx.cmd(&argv("system whoami")).await.unwrap();
        assert_eq!(out, "Username: alice\nFullname: Alice Liddell\n");

        ctx.cmd(&argv("system logout")).await.unwrap();
        assert!(!ctx.is_logged_in());
    }

    #[tokio::test]
    async fn test_bad_login_counts_against_ip() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "POST", "/cli/");
        let err = ctx.cmd(&argv("system login alice nope")).await.unwrap_err();
        assert_eq!(err.to_string(), "Login incorrect");
        assert_eq!(portal.iptrk.hits(&ctx.client_ip()).await, 1);
    }

    #[tokio::test]
    async fn test_swapadmin() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/cli/");
        login_as(&mut ctx, "root");
        assert_eq!(ctx.cmd(&argv("system swapadmin")).await.unwrap(), "Now a SysAdmin user\n");
        assert!(ctx.is_sysadmin());
        assert_eq!(ctx.cmd(&argv("system swapadmin")).await.unwrap(), "Now a Regular user\n");
    }

    #[tokio::test]
    async fn test_iptrk_commands() {
        let portal = test_portal();
        let mut ctx = test_context(&portal, "GET", "/cli/");
        login_as_sysadmin(&mut ctx, "root");

        assert_eq!(
            ctx.cmd(&argv("system iptrk list")).await.unwrap(),
            "There are currently no entries\n"
        );

        portal.iptrk.count("192.0.2.7".parse().unwrap()).await;
        let out = ctx.cmd(&argv("system iptrk list")).await.unwrap();
        assert!(out.starts_with("         Entered             Last  Status      Count IP\n"));
        assert!(out.contains("   okay          1 192.0.2.7"));

        assert_eq!(
            ctx.cmd(&argv("system iptrk remove 192.0.2.7")).await.unwrap(),
            "IP removed from IPtrk table\n"
        );
        assert_eq!(
            ctx.cmd(&argv("system iptrk remove 192.0.2.7")).await.unwrap(),
            "No such IP in IPtrk table\n"
        );
        assert_eq!(ctx.cmd(&argv("system iptrk flush")).await.unwrap(), "IPtrk flushed\n");
    }
}
