//! CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Generate dynamic help text for the transport argument
fn transport_help() -> String {
    format!(
        "Transport spec, e.g. serial:grep=STLink,baud=115200 [available: {}]",
        rmicro_flash::transport_names_short()
    )
}

/// Parse a `NAME=VALUE` pair
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))
}

#[derive(Parser)]
#[command(name = "rmicro")]
#[command(author, version, about = "Build, deploy and talk to code on microcontrollers", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List transport kinds compiled into this binary
    ListTransports,

    /// List serial ports
    ListPorts {
        /// Only show ports whose device, description or hardware id matches
        #[arg(short, long)]
        grep: Option<String>,
    },

    /// Memory layout operations
    #[command(subcommand)]
    Layout(LayoutCommands),

    /// Artifact archive operations
    #[command(subcommand)]
    Artifact(ArtifactCommands),

    /// Send bytes over a transport and print what comes back
    Exchange(ExchangeArgs),
}

#[derive(Subcommand)]
pub enum LayoutCommands {
    /// Allocate the sections of a TOML device file
    Allocate {
        /// Device file
        device: PathBuf,

        /// Write the layout as TOML instead of printing a table
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ArtifactCommands {
    /// Archive files under a directory into a tar file
    Pack {
        /// Directory the labelled paths are relative to
        #[arg(short, long)]
        base_dir: PathBuf,

        /// Labelled paths, as NAME=PATH[,PATH...] (repeatable)
        #[arg(short, long = "label", value_parser = parse_key_value)]
        labels: Vec<(String, String)>,

        /// Metadata entries, as KEY=JSON (repeatable)
        #[arg(short, long = "meta", value_parser = parse_key_value)]
        meta: Vec<(String, String)>,

        /// Archive type to record
        #[arg(long = "type", default_value = "artifact")]
        artifact_type: String,

        /// Archive path, or an existing directory to write `<name>.tar` into
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the labels and metadata of an archive
    Show {
        /// Archive path
        archive: PathBuf,
    },

    /// Extract an archive into a directory
    Unpack {
        /// Archive path
        archive: PathBuf,

        /// Destination directory (must be missing or empty)
        dest: PathBuf,
    },
}

/// Where exchanged bytes go: a transport spec or a host binary
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct ExchangeSource {
    #[arg(short, long, help = transport_help())]
    pub transport: Option<String>,

    /// Run a micro_binary archive on the host instead
    #[arg(short, long)]
    pub binary: Option<PathBuf>,
}

/// Exchange arguments
#[derive(Args, Debug, Clone)]
pub struct ExchangeArgs {
    #[command(flatten)]
    pub source: ExchangeSource,

    /// Run the binary under the host debugger (requires --binary)
    #[arg(long, requires = "binary")]
    pub debug: bool,

    /// Bytes to send, as hex (e.g. "0102ff")
    #[arg(short, long)]
    pub send: Option<String>,

    /// Number of bytes to read back
    #[arg(short, long, default_value = "0")]
    pub read: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(args: &[&str]) -> Result<ExchangeArgs, clap::Error> {
        let argv = ["rmicro", "exchange"].iter().chain(args);
        match Cli::try_parse_from(argv)?.command {
            Commands::Exchange(args) => Ok(args),
            _ => unreachable!("parsed a different subcommand"),
        }
    }

    #[test]
    fn test_exchange_transport_with_data() {
        let args = exchange(&["-t", "dummy", "--send", "0102", "--read", "2"]).unwrap();
        assert_eq!(args.source.transport.as_deref(), Some("dummy"));
        assert_eq!(args.source.binary, None);
        assert_eq!(args.send.as_deref(), Some("0102"));
        assert_eq!(args.read, 2);
        assert!(!args.debug);
    }

    #[test]
    fn test_exchange_binary_under_debugger() {
        let args = exchange(&["--binary", "fw.tar", "--debug", "--read", "4"]).unwrap();
        assert_eq!(args.source.binary, Some(PathBuf::from("fw.tar")));
        assert!(args.debug);
        assert_eq!(args.read, 4);
    }

    #[test]
    fn test_exchange_needs_exactly_one_source() {
        assert!(exchange(&["--send", "01"]).is_err());
        assert!(exchange(&["-t", "dummy", "--binary", "fw.tar"]).is_err());
        assert!(exchange(&["-t", "dummy", "--debug"]).is_err());
    }
}
