//! `sentient doctor`: check that a run could start.

use sentient_config::AppConfig;

pub async fn run(config: &AppConfig) -> Result<bool, Box<dyn std::error::Error>> {
    println!("Sentient doctor");
    println!("===============\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ok    config file {}", config_path.display());
    } else {
        println!("  note  no config file, using defaults (run `sentient onboard`)");
    }

    if config.has_api_key() || config.default_provider == "ollama" {
        println!("  ok    API key configured");
    } else {
        println!("  FAIL  no API key (set OPENROUTER_API_KEY or api_key in config.toml)");
        issues += 1;
    }

    match super::open_store(config).await {
        Ok(store) => match store.list_sessions(1).await {
            Ok(_) => println!("  ok    session store ({})", store.name()),
            Err(e) => {
                println!("  FAIL  session store: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  FAIL  {e}");
            issues += 1;
        }
    }

    let router = sentient_providers::build_from_config(config);
    match router.default() {
        Some(provider) => match provider.health_check().await {
            Ok(true) => println!("  ok    provider {} reachable", provider.name()),
            Ok(false) => {
                println!("  FAIL  provider {} rejected the health check", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  FAIL  provider {}: {e}", provider.name());
                issues += 1;
            }
        },
        None => {
            println!("  FAIL  provider '{}' is not configured", config.default_provider);
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found.");
    }
    Ok(issues == 0)
}
