use config::Config;
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub context_messages: u32,
    pub expanded_context_messages: u32,
    pub display_messages: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptLimits {
    pub rate_limit_per_sec: usize,
    pub refill_interval_ms: usize,
    pub refill_amount: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub key: String,
    pub endpoint: String,
    pub prompt_limits: PromptLimits,
}

/// Generation parameters passed verbatim to the generative backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub temperature: f64,
    pub top_k: i32,
    pub top_p: f64,
    pub max_output_tokens: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KnownSender {
    pub keyword: String,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    settings: Settings,
    api: ApiConfig,
    model: ModelConfig,
    #[serde(default)]
    known_senders: Vec<KnownSender>,
}

#[derive(Debug)]
pub struct ServerConfig {
    pub settings: Settings,
    pub api: ApiConfig,
    pub model: ModelConfig,
    pub known_senders: Vec<KnownSender>,
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server Config:\n{:?}\n\nModel Config: {:?}\n\nKnown senders:\n{}\n\nAPI endpoint: {} (key set: {})",
            self.settings,
            self.model,
            self.known_senders
                .iter()
                .map(|s| s.keyword.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            self.api.endpoint,
            !self.api.key.is_empty(),
        )
    }
}

lazy_static! {
    pub static ref cfg: ServerConfig = {
        let root = env::var("APP_DIR").unwrap_or_else(|_| {
            let dir =
                env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
            let dir = Path::new(&dir).parent().unwrap().display().to_string();
            format!("{}/config", dir)
        });
        let path = format!("{root}/config.toml");
        let cfg_file: ConfigFile = Config::builder()
            .add_source(config::File::with_name(&path))
            .build()
            .expect("config.toml is required")
            .try_deserialize()
            .expect("config.toml is invalid");

        let ConfigFile {
            settings,
            mut api,
            model,
            known_senders,
        } = cfg_file;

        if let Ok(key) = env::var("GEMINI_API_KEY") {
            api.key = key;
        }

        ServerConfig {
            settings,
            api,
            model,
            known_senders,
        }
    };
}
