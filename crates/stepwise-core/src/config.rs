use crate::constants::{DEFAULT_MODEL, GEMINI_API_BASE};
use crate::extraction::ExtractionMode;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub extraction_mode: ExtractionMode,
}

impl CoreConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            api_base: GEMINI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            extraction_mode: ExtractionMode::default(),
        }
    }

    /// Build a config from `STEPWISE_*` environment variables.
    ///
    /// The API key falls back to `GEMINI_API_KEY` and then `API_KEY`. An
    /// unparseable `STEPWISE_EXTRACTION` value keeps the default mode.
    pub fn from_env() -> Self {
        let api_key = ["STEPWISE_API_KEY", "GEMINI_API_KEY", "API_KEY"]
            .iter()
            .find_map(|name| non_empty_var(name));

        let mut config = Self::new(api_key);
        if let Some(model) = non_empty_var("STEPWISE_MODEL") {
            config.model = model;
        }
        if let Some(base) = non_empty_var("STEPWISE_API_BASE") {
            config.api_base = base;
        }
        if let Some(mode) = non_empty_var("STEPWISE_EXTRACTION") {
            match mode.parse() {
                Ok(mode) => config.extraction_mode = mode,
                Err(e) => tracing::warn!("Ignoring STEPWISE_EXTRACTION: {}", e),
            }
        }
        config
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into()).filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_extraction_mode(mut self, mode: ExtractionMode) -> Self {
        self.extraction_mode = mode;
        self
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new(None)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
