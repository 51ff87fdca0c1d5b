//! Version command implementation

use crate::cli::Output;
use crate::{PKG_DESCRIPTION, PKG_NAME, VERSION};
use anyhow::Result;

/// Execute the version command
pub async fn execute(output: &Output) -> Result<()> {
    if output.is_quiet() {
        println!("{} {}", PKG_NAME, VERSION);
        return Ok(());
    }

    output.header("Watermarker Version Information");
    output.key_value("Version:", &format!("{} v{}", PKG_NAME, VERSION), true);
    output.key_value("Description:", PKG_DESCRIPTION, false);
    output.blank_line();

    output.key_value("Target:", std::env::consts::ARCH, false);
    output.key_value(
        "Profile:",
        if cfg!(debug_assertions) { "debug" } else { "release" },
        false,
    );
    output.key_value("CPU cores:", &num_cpus::get().to_string(), false);

    output.blank_line();
    output.info("Run 'watermarker --help' for usage information");
    Ok(())
}
