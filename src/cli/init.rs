//! Initialize command.

use console::style;

use crate::config::Settings;

use super::helpers::open_store;

/// Initialize the database and write a default config file if none exists.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    // Opening the store creates the schema.
    let _store = open_store(&settings.database.path)?;
    println!(
        "{} Database ready at {}",
        style("✓").green(),
        settings.database.path.display()
    );

    let config_path = std::path::Path::new("jobscout.toml");
    if config_path.exists() {
        println!("{} jobscout.toml already exists, leaving it alone", style("!").yellow());
    } else {
        std::fs::write(config_path, Settings::default_toml())?;
        println!("{} Wrote default config to jobscout.toml", style("✓").green());
    }

    println!("\nNext: add a source, e.g.");
    println!("  jobscout source add acme --kind ats-json --config '{{\"vendor\":\"greenhouse\",\"slug\":\"acme\"}}'");

    Ok(())
}
