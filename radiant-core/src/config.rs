use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::RadiantError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RadiantConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub replies: ReplyConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body. Image turns carry the whole photo as base64.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Writable runtime directory. `~` and `$VARS` are expanded.
    pub data_dir: String,
    pub db_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: ".".to_string(),
            db_file: "chat_history.db".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        let dir = shellexpand::full(&self.data_dir)
            .map(|expanded| expanded.into_owned())
            .unwrap_or_else(|_| self.data_dir.clone());
        PathBuf::from(dir).join(&self.db_file)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    /// Explicit key; takes precedence over `api_key_env` when non-empty.
    pub api_key: String,
    pub text_candidates: Vec<String>,
    pub vision_candidates: Vec<String>,
    pub vision_enabled: bool,
    pub temperature: f64,
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            api_key: String::new(),
            text_candidates: vec!["openai/gpt-4o".to_string()],
            vision_candidates: vec!["openai/gpt-4o".to_string()],
            vision_enabled: true,
            temperature: 0.7,
            timeout_seconds: 50,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PersonaConfig {
    pub system_prompt: String,
    /// Text sent alongside an image when the user typed nothing.
    pub image_caption: String,
    /// Prefix stored in front of image-bearing user turns.
    pub image_marker: String,
    /// Stored in place of the user's text for captionless image turns.
    pub image_label: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.trim().to_string(),
            image_caption: "An image was uploaded for analysis.".to_string(),
            image_marker: "[Image Uploaded]".to_string(),
            image_label: "Image Analysis Request".to_string(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"
You are Radiant, a personal and highly knowledgeable radiology study assistant,
built for one student studying MRI and X-ray.

Rules:
1. Keep it personal: address the student warmly, by name once they have shared it.
2. Be encouraging, supportive and kind.
3. Handle these commands:
- 'position ...': give a detailed technical positioning guide and suggest a visual search.
- image upload: describe the image accurately; for X-ray or MRI images list observations.
  For any other image, describe it kindly and steer back to radiology studies.
- 'quiz': generate 3 short multiple-choice questions on radiology physics or anatomy.
- 'shaghaf': act as a motivation booster for the next study session.
- 'ddx for ...': list 3-5 differential diagnoses with a brief explanation each.
- 'simple explanation of ...': explain the concept with simple language and analogies.
- 'flashcard for ...': ask one question and wait for an answer before revealing it.
- 'summarize ...' or 'key terms in ...': give 3 key bullet points, or define the
  5 most important terms.
- 'spot features on image' with an image: list the visible landmarks or findings.
- 'set goal' or 'study schedule': break the study plan into daily or weekly tasks.
4. For general questions, reply with warm, career-focused advice and bring the
   conversation back to radiology studies.
5. Stay within radiology, anatomy and the physics relevant to the course.
6. Never reveal that you are an AI or a language model; act like a very smart
   senior student and personal tutor.
"#;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HistoryConfig {
    /// Replay only the most recent N turns. Unset replays everything.
    pub max_turns: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReplyConfig {
    pub exhausted: String,
    pub timeout: String,
    pub auth: String,
    pub vision_refused: String,
    pub storage: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            exhausted: "Sorry! The connection was lost, please try again in a moment.".to_string(),
            timeout: "Sorry! The assistant took too long to answer, please try again.".to_string(),
            auth: "Sorry! The assistant could not sign in to the model provider.".to_string(),
            vision_refused: "Sorry! Image analysis is not available right now.".to_string(),
            storage: "Sorry! Something went wrong while saving our conversation.".to_string(),
        }
    }
}

impl RadiantConfig {
    /// Load defaults, then the optional TOML file at `path`, then
    /// `RADIANT__SECTION__KEY` variables, then `PORT`. Fails when no API key
    /// can be resolved.
    pub fn load(path: &str) -> Result<Self, RadiantError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
                RadiantError::InvalidConfig(format!("PORT={raw:?} is not a valid port: {e}"))
            })?),
            Err(_) => None,
        };

        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("RADIANT")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("model.text_candidates")
                    .with_list_parse_key("model.vision_candidates")
                    .try_parsing(true),
            )
            .set_override_option("server.port", port.map(i64::from))?
            .build()?;

        let mut config: RadiantConfig = s.try_deserialize()?;
        config.resolve_api_key()?;
        Ok(config)
    }

    /// Fill `model.api_key` from the environment when the file left it empty.
    pub fn resolve_api_key(&mut self) -> Result<(), RadiantError> {
        if self.model.api_key.trim().is_empty() {
            self.model.api_key = std::env::var(&self.model.api_key_env).unwrap_or_default();
        }
        if self.model.api_key.trim().is_empty() {
            return Err(RadiantError::MissingCredential(self.model.api_key_env.clone()));
        }
        Ok(())
    }
}
