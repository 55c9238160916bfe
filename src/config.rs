//! Runtime configuration read once from the process environment.

use std::path::PathBuf;

use crate::error::FareError;
use crate::llm::ChatConfig;

pub const DEFAULT_PORT: u16 = 3000;
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_STATIC_DIR: &str = "public";
const DEFAULT_MODEL_PATH: &str = "fare-model.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub llm: ChatConfig,
    pub static_dir: PathBuf,
    pub stations_path: PathBuf,
    pub fares_path: PathBuf,
    pub fare_model_path: PathBuf,
    pub line_aliases_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, FareError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FareError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| FareError::Config(format!("PORT must be a port number, got {raw:?}")))?,
            None => DEFAULT_PORT,
        };

        let static_dir = PathBuf::from(get("STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.into()));
        let stations_path = get("STATIONS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| static_dir.join("station.json"));
        let fares_path = get("FARES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| static_dir.join("fares.json"));

        Ok(Self {
            port,
            llm: ChatConfig {
                api_base: get("LLM_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into()),
                api_key: get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")),
                model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
                temperature: 0.2,
            },
            stations_path,
            fares_path,
            static_dir,
            fare_model_path: get("FARE_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| DEFAULT_MODEL_PATH.into()),
            line_aliases_path: get("LINE_ALIASES_PATH").map(PathBuf::from),
        })
    }
}
