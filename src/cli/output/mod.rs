//! CLI output formatting module

pub mod progress;
pub mod summary;

use serde::Serialize;

pub use progress::{create_progress_bar, track_events, SuspendingWriter};
pub use summary::RunSummary;

/// Trait for types that can be rendered as human-readable or JSON output.
pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

/// Dispatch output based on JSON mode flag.
///
/// JSON goes to stdout for tools; the human summary goes to stderr so it
/// does not mix with streamed test output.
pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&result.to_json()).unwrap_or_default()
        );
    } else {
        eprintln!("{}", result.to_human());
    }
}
