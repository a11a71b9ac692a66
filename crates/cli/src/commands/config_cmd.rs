//! `wela config` — Configuration management commands.

use wela_config::AppConfig;

pub fn print_default() {
    println!("{}", AppConfig::default_toml());
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            if config.has_api_key() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                println!("   ⚠️  No API key set (set WELA_API_KEY or OPENAI_API_KEY)");
            }

            println!();
            println!("   Endpoint:  {}", config.base_url);
            println!("   Model:     {}", config.model);
            println!("   Max loop:  {}", config.agent.max_loop);
            println!("   Memory:    {:?}", config.memory.backend);
            println!("   Tools:     {}", config.tools.enabled.join(", "));
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", redacted_toml(config)?);
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}

fn redacted_toml(mut config: AppConfig) -> Result<String, toml::ser::Error> {
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    if config.memory.qdrant_api_key.is_some() {
        config.memory.qdrant_api_key = Some("[REDACTED]".into());
    }
    toml::to_string_pretty(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains(".wela"));
    }

    #[test]
    fn show_never_prints_the_key() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.memory.qdrant_api_key = Some("qd-secret".into());
        let rendered = redacted_toml(config).unwrap();
        assert!(!rendered.contains("sk-secret"));
        assert!(!rendered.contains("qd-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
