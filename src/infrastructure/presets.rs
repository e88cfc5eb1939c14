use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use crate::core::job_service::PresetParser;
use crate::domain::{GeometryType, TagMap};
use crate::utils::error::{AppError, Result};

/// Preset au format JSON: `{"amenity=hospital": ["point", "polygon"], ...}`
#[derive(Debug, Clone, Default)]
pub struct JsonPresetParser;

impl JsonPresetParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_str(content: &str) -> Result<TagMap> {
        let tags: TagMap = serde_json::from_str(content)
            .map_err(|e| AppError::ParseError(format!("invalid preset: {}", e)))?;

        if let Some((name, _)) = tags.iter().find(|(name, types)| name.trim().is_empty() || types.is_empty()) {
            return Err(AppError::ParseError(format!(
                "preset entry '{}' must have a name and at least one geometry type",
                name
            )));
        }
        Ok(tags)
    }
}

#[async_trait]
impl PresetParser for JsonPresetParser {
    async fn parse(&self, path: &Path) -> Result<TagMap> {
        debug!("Lecture du preset {}", path.display());
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_str(&content)
    }
}

/// Tags utilisés quand le job n'a pas de preset
pub fn default_tags() -> TagMap {
    use GeometryType::{Line, Point, Polygon};

    let entries: [(&str, &[GeometryType]); 14] = [
        ("aeroway", &[Point, Line, Polygon]),
        ("amenity", &[Point, Polygon]),
        ("barrier", &[Point, Line]),
        ("building", &[Point, Polygon]),
        ("highway", &[Point, Line]),
        ("landuse", &[Point, Polygon]),
        ("leisure", &[Point, Polygon]),
        ("man_made", &[Point, Polygon]),
        ("natural", &[Point, Line, Polygon]),
        ("place", &[Point, Polygon]),
        ("railway", &[Point, Line]),
        ("shop", &[Point, Polygon]),
        ("tourism", &[Point, Polygon]),
        ("waterway", &[Point, Line, Polygon]),
    ];

    entries
        .iter()
        .map(|(name, types)| (name.to_string(), types.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_tags() {
        let tags = default_tags();
        assert!(!tags.is_empty());
        assert_eq!(tags["building"], vec![GeometryType::Point, GeometryType::Polygon]);
        assert!(tags.values().all(|types| !types.is_empty()));
    }

    #[test]
    fn test_parse_str_rejects_entries_without_types() {
        assert!(JsonPresetParser::parse_str(r#"{"amenity": []}"#).is_err());
        assert!(JsonPresetParser::parse_str(r#"{"amenity": ["area"]}"#).is_err());
        assert!(JsonPresetParser::parse_str("<presets/>").is_err());
    }

    #[tokio::test]
    async fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"amenity=hospital": ["point", "polygon"], "highway": ["line"]}}"#).unwrap();

        let tags = JsonPresetParser::new().parse(file.path()).await.unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["highway"], vec![GeometryType::Line]);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = JsonPresetParser::new().parse(&dir.path().join("absent.json")).await;
        assert!(matches!(result, Err(AppError::Io(_))));
    }
}
