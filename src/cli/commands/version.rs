use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct VersionArgs {
    /// Show detailed version information
    #[arg(short = 'd', long = "detailed")]
    pub detailed: bool,
}

pub fn execute(args: VersionArgs) -> Result<()> {
    println!("{} {}", crate::PKG_NAME, crate::VERSION);
    if args.detailed {
        println!("Description: {}", crate::PKG_DESCRIPTION);
        println!("Rust Edition: 2024");
        println!("Target: {}-{}", std::env::consts::ARCH, std::env::consts::OS);
        println!("CPU cores: {}", num_cpus::get());
        println!(
            "Profile: {}",
            if cfg!(debug_assertions) { "debug" } else { "release" }
        );
    }
    Ok(())
}
