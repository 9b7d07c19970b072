// vidsme_bridge/image_job/src/request.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;

/// What the caller asks for. Unset fields fall back to configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub size: Option<String>,
    pub user_id: Option<String>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        ImageRequest {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// JSON body of the creation request. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskBody {
    pub prompt: String,
    pub model: String,
    pub user_id: String,
    pub height: u32,
    pub width: u32,
}

impl TaskBody {
    pub fn resolve(request: &ImageRequest, config: &Config) -> Self {
        let (width, height) = resolve_size(request.size.as_deref(), config);
        let user_id = match request.user_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => synthesize_user_id(),
        };
        TaskBody {
            prompt: format!("{}{}", config.prompt_prefix, request.prompt),
            model: resolve_model(request.model.as_deref(), config),
            user_id,
            height,
            width,
        }
    }
}

/// Upstream model id. Unknown or missing models use the default model.
pub fn resolve_model(model: Option<&str>, config: &Config) -> String {
    let model = match model {
        Some(m) if config.models.iter().any(|known| known == m) => m,
        _ => config.default_model.as_str(),
    };
    config
        .model_aliases
        .iter()
        .find(|(public, _)| public == model)
        .map(|(_, upstream)| upstream.clone())
        .unwrap_or_else(|| model.to_string())
}

/// `(width, height)` for a size name.
pub fn resolve_size(size: Option<&str>, config: &Config) -> (u32, u32) {
    let name = size.unwrap_or(config.default_size.as_str());
    config
        .sizes
        .iter()
        .find(|option| option.name == name)
        .map(|option| (option.width, option.height))
        .unwrap_or(config.fallback_size)
}

/// 64 hex characters: two hyphen-less v4 UUIDs.
pub fn synthesize_user_id() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}
