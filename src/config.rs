use anyhow::{anyhow, Result};
use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::info;

pub const DEFAULT_TEACHER_CODE: &str = "dolores@222";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,
    /// JSON behavior catalog; the built-in catalog is used when unset
    pub behaviors_path: Option<PathBuf>,
    pub teacher_activation_code: String,
    /// Seed the demo roster into an empty store
    pub seed_demo: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            db_path: PathBuf::from(try_load::<String, _>(&lookup, "POINTS_DB_PATH", "points.db")?),
            port: try_load(&lookup, "POINTS_PORT", "3000")?,
            behaviors_path: lookup("POINTS_BEHAVIORS_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            teacher_activation_code: try_load(&lookup, "POINTS_TEACHER_CODE", DEFAULT_TEACHER_CODE)?,
            seed_demo: try_load(&lookup, "POINTS_SEED_DEMO", "true")?,
        })
    }
}

fn try_load<T, F>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {key} value: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.db_path, PathBuf::from("points.db"));
        assert_eq!(config.port, 3000);
        assert_eq!(config.behaviors_path, None);
        assert_eq!(config.teacher_activation_code, DEFAULT_TEACHER_CODE);
        assert!(config.seed_demo);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("POINTS_DB_PATH", "/tmp/class.db"),
            ("POINTS_PORT", "8080"),
            ("POINTS_BEHAVIORS_PATH", "behaviors.json"),
            ("POINTS_SEED_DEMO", "false"),
        ])
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/class.db"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.behaviors_path, Some(PathBuf::from("behaviors.json")));
        assert!(!config.seed_demo);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(config_from(&[("POINTS_PORT", "eighty")]).is_err());
        assert!(config_from(&[("POINTS_SEED_DEMO", "maybe")]).is_err());
    }
}
