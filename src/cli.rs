use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Watch a live identifier list and raise alerts when new identifiers register.
///
/// uid-watch follows one document holding a list of identifiers, detects newly
/// appended entries, and rings, flags and notifies for each one.
#[derive(Parser, Debug)]
#[command(
    name = "uid-watch",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the configured document and alert on new identifiers.
    ///
    /// Reads operator commands from stdin, one per line:
    /// test, stop, sound, background, dismiss, open, close, click, status, quit.
    Watch {
        /// Data root holding `<collection>/<document>.json` and `uid-watch.toml`.
        path: PathBuf,

        /// Start with sound alerts disabled.
        #[arg(long)]
        no_sound: bool,
    },

    /// Print the current identifier list once.
    Status {
        /// Data root holding `<collection>/<document>.json` and `uid-watch.toml`.
        path: PathBuf,

        /// Output results as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

/// A line of operator input while watching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    TestSound,
    StopSound,
    ToggleSound,
    ToggleBackground,
    Dismiss,
    OpenDetail,
    CloseDetail,
    ClickNotification,
    Status,
    Quit,
}

impl OperatorCommand {
    /// Parse one input line. Blank or unknown input yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let command = match line.trim().to_ascii_lowercase().as_str() {
            "test" => Self::TestSound,
            "stop" => Self::StopSound,
            "sound" => Self::ToggleSound,
            "background" | "bg" => Self::ToggleBackground,
            "dismiss" => Self::Dismiss,
            "open" => Self::OpenDetail,
            "close" => Self::CloseDetail,
            "click" => Self::ClickNotification,
            "status" => Self::Status,
            "quit" | "exit" => Self::Quit,
            _ => return None,
        };
        Some(command)
    }
}
