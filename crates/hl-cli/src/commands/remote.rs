//! Connection check and one-off remote commands

use std::io::Write;

use anyhow::{Context as _, Result};

use hl_remote::CommandRunner;

use crate::context::Context;
use crate::output::print_success;

/// Run a trivial command to prove the login works
pub async fn verify(ctx: &Context) -> Result<()> {
    ctx.scheduler()
        .verify_connection()
        .await
        .with_context(|| format!("Connection to {} failed", ctx.credentials.address()))?;
    print_success(&format!(
        "Connected to {} as {}",
        ctx.credentials.address(),
        ctx.credentials.username
    ));
    Ok(())
}

/// Run `command` remotely, echo its output and return its exit code
pub async fn exec(ctx: &Context, command: &[String]) -> Result<i32> {
    let command = command.join(" ");
    tracing::debug!("exec on {}: {}", ctx.credentials.address(), command);

    let result = ctx
        .runner()
        .execute(&ctx.credentials, &command)
        .await
        .with_context(|| format!("Failed to run command on {}", ctx.credentials.address()))?;

    std::io::stdout().write_all(result.stdout.as_bytes())?;
    std::io::stderr().write_all(result.stderr.as_bytes())?;
    std::io::stdout().flush()?;

    Ok(exit_code(result.exit_code))
}

/// Remote exit status, 1 when the process died without one
fn exit_code(code: Option<i32>) -> i32 {
    code.unwrap_or(1)
}
