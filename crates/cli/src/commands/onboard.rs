//! `sentient onboard`: first-time setup.

use sentient_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Sentient: first-time setup");
    println!("==========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    } else {
        println!("Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\nConfig already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Add your API key to {} or export OPENROUTER_API_KEY", config_path.display());
    println!("  2. Run: sentient run \"list the files in the current directory\"\n");

    Ok(())
}

#[cfg(test)]
mod tests {
    use sentient_config::AppConfig;

    #[test]
    fn default_config_parses_back() {
        let text = AppConfig::default_toml();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.agent.max_turns, AppConfig::default().agent.max_turns);
        parsed.validate().unwrap();
    }
}
