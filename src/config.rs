use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Environment variable naming a TOML file that replaces the embedded defaults.
pub const CONFIG_PATH_ENV: &str = "POKEDEX_CONFIG";

const DEFAULT_CONFIG: &str = include_str!("../config/config.toml");

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    pub pokemon: PokemonConfig,
    pub favorites: FavoritesConfig,
    pub battle: BattleConfig,
    pub server: ServerConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PokemonConfig {
    pub api_url: String,
    pub timeout_ms: u64,
    pub list_limit: u32,
    pub max_concurrent_requests: usize,
    /// Sprite address with an `{id}` placeholder.
    pub sprite_url_template: String,
}

impl PokemonConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sprite_url(&self, id: u32) -> String {
        self.sprite_url_template.replace("{id}", &id.to_string())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FavoritesConfig {
    /// `"memory"` or `"file"`.
    pub r#type: String,
    pub path: PathBuf,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BattleConfig {
    pub turn_delay_ms: u64,
}

impl BattleConfig {
    pub fn turn_delay(&self) -> Duration {
        Duration::from_millis(self.turn_delay_ms)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Config, AppError> {
        let config: Config = toml::from_str(source).map_err(|e| {
            tracing::error!("Failed to parse configuration: {}", e);
            AppError::from(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file named by `POKEDEX_CONFIG`, or the embedded defaults.
    pub fn load() -> Result<Config, AppError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                tracing::info!("Loading configuration from {}", path);
                let source = std::fs::read_to_string(&path).map_err(|e| {
                    tracing::error!("Failed to read config file {}: {}", path, e);
                    AppError::ConfigError(format!("{}: {}", path, e))
                })?;
                Config::from_toml(&source)
            }
            Err(_) => {
                tracing::debug!("{} not set, using embedded configuration", CONFIG_PATH_ENV);
                Config::embedded()
            }
        }
    }

    /// Parses the configuration compiled into the binary.
    pub fn embedded() -> Result<Config, AppError> {
        Config::from_toml(DEFAULT_CONFIG)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.pokemon.max_concurrent_requests == 0 {
            return Err(AppError::ConfigError(
                "pokemon.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.pokemon.max_concurrent_requests > Semaphore::MAX_PERMITS {
            return Err(AppError::ConfigError(format!(
                "pokemon.max_concurrent_requests must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if !self.pokemon.sprite_url_template.contains("{id}") {
            return Err(AppError::ConfigError(
                "pokemon.sprite_url_template must contain an {id} placeholder".to_string(),
            ));
        }
        match self.favorites.r#type.as_str() {
            "memory" | "file" => Ok(()),
            other => Err(AppError::ConfigError(format!(
                "unknown favorites backend: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.pokemon.api_url, "https://pokeapi.co/api/v2");
        assert_eq!(config.pokemon.list_limit, 100);
        assert_eq!(config.battle.turn_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_sprite_url_template() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(
            config.pokemon.sprite_url(25),
            "https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/pokemon/25.png"
        );
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let source = DEFAULT_CONFIG.replace("type = \"file\"", "type = \"sqlite\"");
        assert!(matches!(
            Config::from_toml(&source),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn test_rejects_template_without_placeholder() {
        let source = DEFAULT_CONFIG.replace("{id}.png", "sprite.png");
        assert!(Config::from_toml(&source).is_err());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let source = DEFAULT_CONFIG.replace(
            "max_concurrent_requests = 16",
            "max_concurrent_requests = 0",
        );
        assert!(Config::from_toml(&source).is_err());
    }

    #[test]
    fn test_rejects_concurrency_above_semaphore_limit() {
        let too_many = (Semaphore::MAX_PERMITS + 1).to_string();
        let source = DEFAULT_CONFIG.replace(
            "max_concurrent_requests = 16",
            &format!("max_concurrent_requests = {}", too_many),
        );
        assert!(matches!(
            Config::from_toml(&source),
            Err(AppError::ConfigError(_))
        ));
    }
}
