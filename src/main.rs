//! rmicro - Build, deploy and talk to code on microcontrollers
//!
//! Front end for the rmicro crates:
//! - **Layouts** - partition a device's memory into sections from a TOML
//!   device file
//! - **Artifacts** - pack labelled build outputs into tar archives and
//!   unpack them elsewhere
//! - **Transports** - open a serial port, a host process or a debugged
//!   host process and exchange raw bytes with it

mod cli;
mod commands;

use clap::Parser;
use cli::{ArtifactCommands, Cli, Commands, LayoutCommands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::ListTransports => {
            commands::list_transports();
            Ok(())
        }
        Commands::ListPorts { grep } => commands::list_ports(grep.as_deref()),
        Commands::Layout(subcmd) => match subcmd {
            LayoutCommands::Allocate { device, output } => {
                commands::layout::cmd_allocate(&device, output.as_deref())
            }
        },
        Commands::Artifact(subcmd) => match subcmd {
            ArtifactCommands::Pack {
                base_dir,
                labels,
                meta,
                artifact_type,
                output,
            } => commands::artifact::cmd_pack(&base_dir, &labels, &meta, &artifact_type, &output),
            ArtifactCommands::Show { archive } => commands::artifact::cmd_show(&archive),
            ArtifactCommands::Unpack { archive, dest } => {
                commands::artifact::cmd_unpack(&archive, &dest)
            }
        },
        Commands::Exchange(args) => commands::exchange::cmd_exchange(&args),
    }
}
