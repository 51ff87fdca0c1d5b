//! Command implementations for the watermarker CLI
//!
//! One module per subcommand.

pub mod config;
pub mod run;
pub mod version;
pub mod worker;
