//! Man page generator for rmicro
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]
//!
//! Renders `rmicro.1` plus one page per subcommand (`rmicro-layout.1`, ...).

use clap::CommandFactory;
use std::fs;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

fn render(cmd: clap::Command, name: &str, output_dir: &Path) -> std::io::Result<PathBuf> {
    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd).render(&mut buffer)?;

    let output_path = output_dir.join(format!("{}.1", name));
    fs::write(&output_path, buffer)?;
    Ok(output_path)
}

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    fs::create_dir_all(&output_dir)?;

    let cmd = cli::Cli::command();
    for sub in cmd.get_subcommands() {
        let name = format!("rmicro-{}", sub.get_name());
        render(sub.clone(), &name, &output_dir)?;
    }
    let main_page = render(cmd, "rmicro", &output_dir)?;

    println!("Man pages generated in {}", output_dir.display());
    println!("\nTo view the main page:");
    println!("  man -l {}", main_page.display());

    Ok(())
}
