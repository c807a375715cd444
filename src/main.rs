use anyhow::Result;
use clap::Parser;

use syncbench::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run()
}
