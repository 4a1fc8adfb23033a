//! Track and module models - the authored learning content.

use serde::{Deserialize, Serialize};

use crate::id::{ModuleId, TrackId};
use crate::validation::ValidationError;
use crate::Time;

/// An ordered learning path composed of modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique identifier
    pub id: TrackId,

    /// Track title
    pub title: String,

    /// Short tagline
    #[serde(default)]
    pub subtitle: Option<String>,

    /// Long description
    #[serde(default)]
    pub description: Option<String>,

    /// Categories used for catalog filtering
    #[serde(default)]
    pub categories: Vec<String>,

    /// Difficulty level
    pub level: Level,

    /// Human readable duration, e.g. "3h 20min"
    #[serde(default)]
    pub estimated_duration: Option<String>,

    /// Cover image
    #[serde(default)]
    pub thumbnail_url: Option<String>,

    /// Whether the track requires a premium entitlement
    pub is_premium: bool,

    /// Denormalized module count maintained by the content authors
    pub total_modules: u32,

    /// Only published tracks are visible to learners
    pub is_published: bool,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

impl Track {
    /// Create a published, free track with no modules.
    pub fn new(title: impl Into<String>, level: Level) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: TrackId::new(),
            title: title.into(),
            subtitle: None,
            description: None,
            categories: Vec::new(),
            level,
            estimated_duration: None,
            thumbnail_url: None,
            is_premium: false,
            total_modules: 0,
            is_published: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the track as premium-only.
    pub fn premium(mut self) -> Self {
        self.is_premium = true;
        self
    }

    /// Add a category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Set the subtitle.
    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    /// Set publication state.
    pub fn published(mut self, published: bool) -> Self {
        self.is_published = published;
        self
    }

    /// Validate authored fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyField("track.title"));
        }
        Ok(())
    }
}

/// Track difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    /// No prior experience assumed
    Beginner,
    /// Builds on the basics
    Intermediate,
    /// For practitioners
    Advanced,
}

impl Level {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "Beginner",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
        }
    }
}

impl std::str::FromStr for Level {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" => Ok(Level::Advanced),
            other => Err(ValidationError::UnknownLevel(other.to_string())),
        }
    }
}

/// An atomic learning unit within a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Unique identifier
    pub id: ModuleId,

    /// Owning track
    pub track_id: TrackId,

    /// Module title
    pub title: String,

    /// Learning material
    pub content: ModuleContent,

    /// Position within the track, unique per track
    pub order_index: u32,

    /// Optional video lesson
    #[serde(default)]
    pub video_url: Option<String>,

    /// Prompt tools attached to the module
    #[serde(default)]
    pub tools: Vec<ModuleTool>,

    /// Explicit prerequisite. When absent the previous module by
    /// `order_index` is the prerequisite.
    #[serde(default)]
    pub prerequisite: Option<ModuleId>,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

impl Module {
    /// Create a module with an empty briefing.
    pub fn new(track_id: TrackId, title: impl Into<String>, order_index: u32) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: ModuleId::new(),
            track_id,
            title: title.into(),
            content: ModuleContent::default(),
            order_index,
            video_url: None,
            tools: Vec::new(),
            prerequisite: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Require another module instead of the positional predecessor.
    pub fn with_prerequisite(mut self, module: ModuleId) -> Self {
        self.prerequisite = Some(module);
        self
    }

    /// Set the content.
    pub fn with_content(mut self, content: ModuleContent) -> Self {
        self.content = content;
        self
    }

    /// Validate structure of the module and its payloads.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyField("module.title"));
        }
        if self.prerequisite == Some(self.id) {
            return Err(ValidationError::SelfPrerequisite(self.id.to_string()));
        }
        if let Some(url) = &self.video_url {
            check_url("module.video_url", url)?;
        }
        for tool in &self.tools {
            tool.validate()?;
        }
        self.content.validate()
    }
}

/// Module learning material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleContent {
    /// Mission briefing
    pub briefing: String,

    /// Learning objectives
    #[serde(default)]
    pub objectives: Vec<String>,

    /// Prompts for the learner
    #[serde(default)]
    pub prompts: Vec<ModulePrompt>,

    /// Supporting resources
    #[serde(default)]
    pub resources: Vec<ModuleResource>,
}

impl ModuleContent {
    fn validate(&self) -> Result<(), ValidationError> {
        for prompt in &self.prompts {
            if prompt.content.trim().is_empty() {
                return Err(ValidationError::EmptyField("prompt.content"));
            }
        }
        for resource in &self.resources {
            resource.validate()?;
        }
        Ok(())
    }
}

/// A prompt presented inside a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulePrompt {
    /// Author-assigned identifier
    pub id: String,
    /// Short title
    pub title: String,
    /// What the prompt is for
    pub description: String,
    /// Prompt text
    pub content: String,
    /// Optional grouping
    #[serde(default)]
    pub category: Option<String>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Supporting material, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModuleResource {
    /// External web page
    Link {
        /// Display title
        title: String,
        /// Short description
        description: String,
        /// http(s) location
        url: String,
    },
    /// Downloadable document
    Document {
        /// Display title
        title: String,
        /// Short description
        description: String,
        /// http(s) location
        url: String,
    },
    /// Video hosted elsewhere
    Video {
        /// Display title
        title: String,
        /// Short description
        description: String,
        /// http(s) location
        url: String,
    },
}

impl ModuleResource {
    /// Resource URL regardless of kind.
    pub fn url(&self) -> &str {
        match self {
            ModuleResource::Link { url, .. }
            | ModuleResource::Document { url, .. }
            | ModuleResource::Video { url, .. } => url,
        }
    }

    /// Resource title regardless of kind.
    pub fn title(&self) -> &str {
        match self {
            ModuleResource::Link { title, .. }
            | ModuleResource::Document { title, .. }
            | ModuleResource::Video { title, .. } => title,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.title().trim().is_empty() {
            return Err(ValidationError::EmptyField("resource.title"));
        }
        check_url("resource.url", self.url())
    }
}

/// A copyable prompt tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleTool {
    /// Author-assigned identifier
    pub id: String,
    /// Short title
    pub title: String,
    /// What the tool does
    pub description: String,
    /// Prompt the tool runs
    pub prompt_content: String,
}

impl ModuleTool {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt_content.trim().is_empty() {
            return Err(ValidationError::EmptyField("tool.prompt_content"));
        }
        Ok(())
    }
}

fn check_url(field: &'static str, url: &str) -> Result<(), ValidationError> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(ValidationError::InvalidUrl {
            field,
            url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_is_tagged() {
        let json = r#"{"type":"video","title":"Intro","description":"","url":"https://v.example/1"}"#;
        let resource: ModuleResource = serde_json::from_str(json).unwrap();
        assert!(matches!(resource, ModuleResource::Video { .. }));
        assert_eq!(resource.url(), "https://v.example/1");
    }

    #[test]
    fn test_unknown_resource_kind_rejected() {
        let json = r#"{"type":"podcast","title":"x","description":"","url":"https://p"}"#;
        assert!(serde_json::from_str::<ModuleResource>(json).is_err());
    }

    #[test]
    fn test_module_validation() {
        let track = Track::new("Growth 101", Level::Beginner);
        let mut module = Module::new(track.id, "M0", 0);
        assert!(module.validate().is_ok());

        module.content.resources.push(ModuleResource::Link {
            title: "Docs".into(),
            description: String::new(),
            url: "ftp://nope".into(),
        });
        assert!(matches!(
            module.validate(),
            Err(ValidationError::InvalidUrl { .. })
        ));

        let mut module = Module::new(track.id, "M1", 1);
        module.prerequisite = Some(module.id);
        assert!(matches!(
            module.validate(),
            Err(ValidationError::SelfPrerequisite(_))
        ));
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("advanced".parse::<Level>().unwrap(), Level::Advanced);
        assert!("expert".parse::<Level>().is_err());
    }
}
