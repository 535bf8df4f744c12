//! Output formatting utilities for the CLI
//!
//! Tables for job status and server health, plus colored status messages.

use tabled::{settings::Style, Table, Tabled};

use hl_core::JobId;
use hl_orchestrator::inference::HealthStatus;
use hl_orchestrator::QueueStatus;

/// Format one job's queue status as a table
pub fn format_job_status(job: &JobId, status: &QueueStatus) -> String {
    #[derive(Tabled)]
    struct JobRow {
        #[tabled(rename = "JOB")]
        job: String,
        #[tabled(rename = "STATE")]
        state: String,
        #[tabled(rename = "NODE")]
        node: String,
        #[tabled(rename = "FINISHED")]
        finished: &'static str,
    }

    let row = JobRow {
        job: job.to_string(),
        state: status.state.to_string(),
        node: status.node.clone().unwrap_or_else(|| "-".to_string()),
        finished: if status.state.is_terminal() { "yes" } else { "no" },
    };

    Table::new([row]).with(Style::rounded()).to_string()
}

/// Format the inference server's health report
pub fn format_health(url: &str, health: &HealthStatus) -> String {
    let mut output = String::new();
    output.push_str(&format!("Server:          {}\n", url));
    output.push_str(&format!("Status:          {}\n", health.status));
    output.push_str(&format!(
        "Model loaded:    {}\n",
        if health.model_loaded { "yes" } else { "no" }
    ));
    output.push_str(&format!(
        "Device:          {}\n",
        health.device.as_deref().unwrap_or("-")
    ));
    output.push_str(&format!("Context length:  {}\n", health.context_length));
    output
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message to stderr in red
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message to stderr in yellow
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
