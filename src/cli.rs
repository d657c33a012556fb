//! # Command-Line Interface Module
//!
//! Argument parsing for the three in-scope binaries: the coordinator, the
//! recorder, and the replayer. This is deliberately narrow — the full YAML
//! launch-file parser and the `topic ls/info/print/hz` / `schema print`
//! subcommands are out of scope (spec.md §1) and are not reproduced here.
//! Each binary gets its own `Args` struct, all styled the same way.

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser,
};
use std::path::PathBuf;

/// Defines the styles for the help message, matching every `basis-*` binary.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Shared verbosity/logging flags every binary accepts.
#[derive(Parser, Debug, Clone)]
pub struct LoggingArgs {
    /// Increase diagnostic log verbosity on stdout.
    ///
    /// Can be used multiple times to increase detail:
    ///  -v: debug
    ///  -vv: trace
    /// Ignored if `RUST_LOG` is set. By default, only INFO and above are shown.
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Logging")]
    pub verbose: u8,

    /// Directory to write a rolling daily log file to, in addition to stdout.
    #[arg(long, help_heading = "Logging")]
    pub log_dir: Option<PathBuf>,
}

/// `basis-coordinator` — aggregates per-process topology reports into a
/// network-wide `NetworkInfo` and serves the schema registry (spec.md §4.10).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct CoordinatorArgs {
    #[command(flatten)]
    pub logging: LoggingArgs,

    /// Port to listen on. `0` picks an OS-assigned ephemeral port.
    #[arg(short = 'p', long, default_value_t = crate::coordinator::DEFAULT_COORDINATOR_PORT)]
    pub port: u16,

    /// How often to run one aggregation/broadcast cycle, in milliseconds.
    ///
    /// spec.md §5 suggests a 50ms cadence; the coordinator has no thread or
    /// heartbeat of its own, so this binary drives `Coordinator::update()`
    /// itself on a sleep loop at this period.
    #[arg(long, default_value_t = 50)]
    pub update_period_ms: u64,
}

/// `basis-record` — subscribes to one or more topics on a running transport
/// graph and writes them to an MCAP file (spec.md §4.13).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct RecordArgs {
    #[command(flatten)]
    pub logging: LoggingArgs,

    /// Output MCAP file path.
    #[arg(short = 'o', long, default_value = "recording.mcap")]
    pub output: PathBuf,

    /// Regex topic filters; a topic is recorded if it matches at least one.
    /// Defaults to recording every topic.
    #[arg(short = 't', long = "topic", default_values_t = vec![".*".to_string()])]
    pub topics: Vec<String>,

    /// Coordinator address to connect to for topology discovery.
    #[arg(long, default_value = "127.0.0.1")]
    pub coordinator_host: String,

    /// Coordinator port.
    #[arg(long, default_value_t = crate::coordinator::DEFAULT_COORDINATOR_PORT)]
    pub coordinator_port: u16,

    /// Split to a new file (named `<output>.N`) once the current one
    /// reaches this many bytes. `0` disables splitting.
    #[arg(long, default_value_t = 0)]
    pub split_size_bytes: u64,
}

/// `basis-replay` — reads back an MCAP recording and republishes it at
/// wall-clock pace (spec.md §4.14).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct ReplayArgs {
    #[command(flatten)]
    pub logging: LoggingArgs,

    /// Input MCAP file to replay.
    pub input: PathBuf,

    /// Loop the recording indefinitely instead of playing it once.
    #[arg(short = 'l', long)]
    pub looping: bool,

    /// Coordinator address to publish the replayed topics through.
    #[arg(long, default_value = "127.0.0.1")]
    pub coordinator_host: String,

    /// Coordinator port.
    #[arg(long, default_value_t = crate::coordinator::DEFAULT_COORDINATOR_PORT)]
    pub coordinator_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_args_default_port_matches_constant() {
        let args = CoordinatorArgs::parse_from(["basis-coordinator"]);
        assert_eq!(args.port, crate::coordinator::DEFAULT_COORDINATOR_PORT);
        assert_eq!(args.update_period_ms, 50);
    }

    #[test]
    fn record_args_default_topic_filter_matches_everything() {
        let args = RecordArgs::parse_from(["basis-record"]);
        assert_eq!(args.topics, vec![".*".to_string()]);
    }

    #[test]
    fn replay_args_requires_input_path() {
        let args = ReplayArgs::parse_from(["basis-replay", "session.mcap"]);
        assert_eq!(args.input, PathBuf::from("session.mcap"));
        assert!(!args.looping);
    }
}
