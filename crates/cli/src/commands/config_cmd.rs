//! `sentient config`: print the effective configuration.

use sentient_config::AppConfig;

pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    println!("{}", config.redacted().to_toml()?);
    Ok(())
}
