//! Commands fanned out to the nodes.

use std::io::Write;

use whalebone_core::Shutdown;
use whalebone_dispatch::DispatchResult;
use whalebone_lifecycle::{ClusterLifecycle, Step};

/// Run `command` everywhere, print each host's output, then fail if any
/// host failed.
pub async fn run(
    lifecycle: &ClusterLifecycle,
    command: &str,
    shutdown: &Shutdown,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let result = lifecycle.dispatch(command, shutdown).await?;
    report(&result, out)?;
    result.into_result()?;
    Ok(())
}

pub async fn run_first(
    lifecycle: &ClusterLifecycle,
    command: &str,
    shutdown: &Shutdown,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let result = lifecycle.dispatch_first(command, shutdown).await?;
    report(&result, out)?;
    result.into_result()?;
    Ok(())
}

pub async fn steps(
    lifecycle: &ClusterLifecycle,
    steps: &[Step],
    shutdown: &Shutdown,
) -> anyhow::Result<()> {
    lifecycle.run_steps(steps, shutdown).await?;
    Ok(())
}

/// `[n] [SUCCESS] host` per host followed by its stdout.
pub fn report(result: &DispatchResult, out: &mut dyn Write) -> std::io::Result<()> {
    for (n, outcome) in result.outcomes.iter().enumerate() {
        let status = match (outcome.succeeded(), outcome.exit_code) {
            (true, _) => "SUCCESS".to_string(),
            (false, Some(code)) => format!("FAILURE exit {code}"),
            (false, None) => "FAILURE".to_string(),
        };
        writeln!(out, "[{}] [{status}] {}", n + 1, outcome.host)?;
        if !outcome.stdout.is_empty() {
            write!(out, "{}", outcome.stdout)?;
            if !outcome.stdout.ends_with('\n') {
                writeln!(out)?;
            }
        }
        if let (false, Some(error)) = (outcome.succeeded(), &outcome.error) {
            writeln!(out, "stderr: {}", error.trim_end())?;
        }
    }
    Ok(())
}
