//! Command implementations, one module per subcommand

pub mod config;
pub mod demo;
pub mod run;
pub mod version;
pub mod worker;
