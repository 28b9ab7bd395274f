//! `/api/<cmd>/<arg>/...` command execution.

use futures::future::BoxFuture;

use crate::context::RequestContext;

/// Run the remaining path as a command line. Output is plain text; the
/// session travels in the `Authorization` header, never in a cookie.
pub fn h_api<'a>(ctx: &'a mut RequestContext) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        if ctx.token().is_empty() {
            ctx.set_bearer_auth();
        }

        ctx.set_content_type("text/plain; charset=utf-8");

        let argv: Vec<String> = ctx.path().iter().filter(|s| !s.is_empty()).cloned().collect();
        match ctx.cmd(&argv).await {
            Ok(out) => ctx.out(&out),
            Err(e) => ctx.outln(&format!("An error occured: {}", e)),
        }
    })
}
