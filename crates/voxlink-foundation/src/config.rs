use crate::error::AppError;
use serde::Deserialize;

/// Application settings, constructed once at startup and passed by
/// reference into each component's constructor.
///
/// Values come from an optional `voxlink.toml` in the working directory,
/// overridden by `VOXLINK__SECTION__KEY` environment variables.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub stt: SttSettings,
    #[serde(default)]
    pub wake: WakeSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSettings {
    /// MAC address (or platform identifier) of the wearable.
    pub mac: String,
    /// Notification characteristic carrying compressed audio.
    pub audio_char_uuid: String,
    /// HTTP-style backend base address; the WebSocket scheme is derived.
    pub backend_url: String,
    pub user_id: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            mac: String::new(),
            audio_char_uuid: "19b10001-e8f2-537e-4f6c-d104768a1214".to_string(),
            backend_url: "http://localhost:8000".to_string(),
            user_id: "test_user".to_string(),
        }
    }
}

impl DeviceSettings {
    /// Rewrite the configured HTTP base address to its WebSocket scheme
    /// (`http` -> `ws`, `https` -> `wss`).
    pub fn websocket_base_url(&self) -> String {
        if let Some(rest) = self.backend_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.backend_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.backend_url.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SttSettings {
    /// Streaming endpoint of the transcription provider.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub language: String,
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
            api_key: String::new(),
            model: "nova-2".to_string(),
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WakeSettings {
    /// Case-insensitive trigger phrase that gates command mode.
    pub phrase: String,
}

impl Default for WakeSettings {
    fn default() -> Self {
        Self {
            phrase: "dadd-e".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSettings {
    pub classifier_url: String,
    pub action_log_url: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            classifier_url: "http://localhost:8100/intent/classify".to_string(),
            action_log_url: "http://localhost:8100/actions/log".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, AppError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::with_name("voxlink").required(false))
            .add_source(
                config::Environment::with_prefix("VOXLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.server.port == 0 {
            return Err(AppError::Config("server.port must be non-zero".into()));
        }
        if self.wake.phrase.trim().is_empty() {
            return Err(AppError::Config("wake.phrase must not be empty".into()));
        }
        Ok(())
    }
}
