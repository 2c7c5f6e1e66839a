//! Command-line interface

pub mod commands;
pub mod output;
pub mod types;

pub use types::Cli;

use std::process::ExitCode;

/// Exit status when every package passed and every merge succeeded.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit status when at least one package or merge failed.
pub const EXIT_FAILURES: u8 = 1;
/// Exit status for errors that stopped the run.
pub const EXIT_FATAL: u8 = 2;

/// Report a fatal error and return the matching exit status.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ExitCode {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        println!(
            "{}",
            serde_json::json!({ "success": false, "error": err.to_string(), "causes": chain })
        );
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    ExitCode::from(EXIT_FATAL)
}
