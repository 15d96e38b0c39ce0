// Configuration constants for the server

use std::time::Duration;

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub llm_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub index_path: String,
    pub api_base: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8086,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            llm_model: "gpt-4.1-mini".to_string(),
            tts_model: "gpt-4o-mini-tts".to_string(),
            tts_voice: "alloy".to_string(),
            index_path: "server/static/stream.html".to_string(),
            api_base: llm_core::DEFAULT_API_BASE.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let rate_limit_per_minute = std::env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_per_minute);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect()
            });

        let llm_model = std::env::var("LLM_MODEL").unwrap_or(defaults.llm_model);
        let tts_model = std::env::var("TTS_MODEL").unwrap_or(defaults.tts_model);
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or(defaults.tts_voice);
        let index_path = std::env::var("INDEX_PATH").unwrap_or(defaults.index_path);
        let api_base = std::env::var("OPENAI_API_BASE").unwrap_or(defaults.api_base);

        Self {
            port,
            rate_limit_per_minute,
            request_timeout_secs,
            cors_allowed_origins,
            llm_model,
            tts_model,
            tts_voice,
            index_path,
            api_base,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
