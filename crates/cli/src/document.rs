//! JSON document accepted by `trackflow import`.

use serde::Deserialize;
use trackflow_core::{Level, Module, ModuleContent, ModuleTool, Track};

/// A track as authored, with modules in order.
#[derive(Debug, Deserialize)]
pub struct TrackDocument {
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub level: Level,
    #[serde(default)]
    pub estimated_duration: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default = "default_published")]
    pub is_published: bool,
    #[serde(default)]
    pub modules: Vec<ModuleDocument>,
}

/// One module; its position in the list is its `order_index`.
#[derive(Debug, Deserialize)]
pub struct ModuleDocument {
    pub title: String,
    #[serde(default)]
    pub content: ModuleContent,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub tools: Vec<ModuleTool>,
    /// Position of an earlier module in this document
    #[serde(default)]
    pub prerequisite: Option<usize>,
}

fn default_published() -> bool {
    true
}

impl TrackDocument {
    /// Build the track and its modules with fresh ids.
    pub fn into_parts(self) -> anyhow::Result<(Track, Vec<Module>)> {
        let mut track = Track::new(self.title, self.level).published(self.is_published);
        track.subtitle = self.subtitle;
        track.description = self.description;
        track.categories = self.categories;
        track.estimated_duration = self.estimated_duration;
        track.thumbnail_url = self.thumbnail_url;
        track.is_premium = self.is_premium;

        let mut modules: Vec<Module> = self
            .modules
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let mut module = Module::new(track.id, doc.title.clone(), i as u32)
                    .with_content(doc.content.clone());
                module.video_url = doc.video_url.clone();
                module.tools = doc.tools.clone();
                module
            })
            .collect();

        for (i, doc) in self.modules.iter().enumerate() {
            if let Some(p) = doc.prerequisite {
                if p >= i {
                    anyhow::bail!(
                        "module {} names prerequisite {} which is not an earlier module",
                        i,
                        p
                    );
                }
                modules[i].prerequisite = Some(modules[p].id);
            }
        }
        Ok((track, modules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let doc: TrackDocument = serde_json::from_str(
            r#"{
                "title": "Growth 101",
                "level": "Beginner",
                "categories": ["growth"],
                "modules": [
                    {"title": "Foundations"},
                    {"title": "Experiments", "content": {"briefing": "Run one",
                        "resources": [{"type": "link", "title": "Guide",
                                       "description": "", "url": "https://example.com"}]}},
                    {"title": "Scaling", "prerequisite": 0}
                ]
            }"#,
        )
        .unwrap();

        let (track, modules) = doc.into_parts().unwrap();
        assert!(track.is_published);
        assert_eq!(modules.len(), 3);
        assert_eq!(modules[2].order_index, 2);
        assert_eq!(modules[2].prerequisite, Some(modules[0].id));
        assert_eq!(modules[1].content.resources.len(), 1);
    }

    #[test]
    fn test_dangling_prerequisite() {
        let doc: TrackDocument = serde_json::from_str(
            r#"{"title": "T", "level": "Beginner", "modules": [{"title": "A", "prerequisite": 4}]}"#,
        )
        .unwrap();
        assert!(doc.into_parts().is_err());

        let doc: TrackDocument = serde_json::from_str(
            r#"{"title": "T", "level": "Beginner",
                "modules": [{"title": "A", "prerequisite": 1}, {"title": "B"}]}"#,
        )
        .unwrap();
        assert!(doc.into_parts().is_err());
    }
}
