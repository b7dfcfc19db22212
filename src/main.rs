use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod config;
mod fields;
mod hooks;
mod notice;
mod poll;
mod submit;
mod terminal;

#[cfg(test)]
mod test_support;

use cli::Args;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    commands::run_command(args)
}
