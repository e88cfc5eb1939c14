use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::domain::geometry::{validate_geometry, Geometry};
use crate::utils::error::AppError;

/// Type de géométrie auquel s'applique un tag OSM
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryType {
    Point,
    Line,
    Polygon,
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeometryType::Point => "point",
            GeometryType::Line => "line",
            GeometryType::Polygon => "polygon",
        };
        f.write_str(name)
    }
}

impl FromStr for GeometryType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "point" => Ok(GeometryType::Point),
            "line" => Ok(GeometryType::Line),
            "polygon" => Ok(GeometryType::Polygon),
            other => Err(AppError::ParseError(format!("Unknown geometry type: {}", other))),
        }
    }
}

/// Tags d'un preset: nom du tag -> types de géométrie
pub type TagMap = BTreeMap<String, Vec<GeometryType>>;

/// Type de fichier de configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfigType {
    Preset,
    Translation,
    Transform,
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigType::Preset => "PRESET",
            ConfigType::Translation => "TRANSLATION",
            ConfigType::Transform => "TRANSFORM",
        };
        f.write_str(name)
    }
}

impl FromStr for ConfigType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRESET" => Ok(ConfigType::Preset),
            "TRANSLATION" => Ok(ConfigType::Translation),
            "TRANSFORM" => Ok(ConfigType::Transform),
            other => Err(AppError::ParseError(format!("Unknown config type: {}", other))),
        }
    }
}

/// Format d'export (données de référence, lecture seule)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportFormat {
    pub slug: String,
    pub name: String,
    pub description: String,
}

/// Fichier de configuration téléversé (preset, traduction, transformation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    pub uid: Uuid,
    pub name: String,
    pub config_type: ConfigType,
    /// Chemin relatif du fichier sous la racine des uploads
    pub upload: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

/// Tag appartenant à un seul job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub job_uid: Uuid,
    pub name: String,
    pub geom_types: Vec<GeometryType>,
}

impl Tag {
    pub fn new(job_uid: Uuid, name: String, geom_types: Vec<GeometryType>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_uid,
            name,
            geom_types,
        }
    }

    /// Un tag par entrée de la table, dans l'ordre des noms
    pub fn from_map(job_uid: Uuid, tags: &TagMap) -> Vec<Tag> {
        tags.iter()
            .map(|(name, geom_types)| Tag::new(job_uid, name.clone(), geom_types.clone()))
            .collect()
    }
}

/// Représente un job d'export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub uid: Uuid,
    pub name: String,
    pub description: String,
    pub geometry: Geometry,
    #[serde(rename = "owner")]
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub published: bool,
}

impl Job {
    /// Crée un nouveau job (non persisté)
    pub fn new(
        user_id: Uuid,
        name: String,
        description: String,
        geometry: Geometry,
        published: bool,
    ) -> Self {
        Self {
            uid: Uuid::new_v4(),
            name,
            description,
            geometry,
            user_id,
            created_at: Utc::now(),
            published,
        }
    }
}

/// Job persisté avec ses formats, tags, configurations et fournisseurs
#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: Job,
    pub formats: Vec<ExportFormat>,
    pub tags: Vec<Tag>,
    pub configs: Vec<ExportConfig>,
    pub providers: Vec<String>,
}

/// Refuse une chaîne faite uniquement d'espaces
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Ce champ ne peut pas être vide".into());
        return Err(err);
    }
    Ok(())
}

/// Pour créer un nouveau job
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewJobRequest {
    #[validate(
        custom = "validate_not_blank",
        length(min = 1, max = 100, message = "Le nom doit faire entre 1 et 100 caractères")
    )]
    pub name: String,

    #[validate(
        custom = "validate_not_blank",
        length(min = 1, max = 1000, message = "La description doit faire entre 1 et 1000 caractères")
    )]
    pub description: String,

    #[validate(custom = "validate_geometry")]
    pub geometry: Geometry,

    /// Slugs des formats d'export demandés
    #[serde(default)]
    pub formats: Vec<String>,

    #[serde(default)]
    pub preset: Option<Uuid>,

    #[serde(default)]
    pub translation: Option<Uuid>,

    #[serde(default)]
    pub transform: Option<Uuid>,

    /// Slugs des fournisseurs de données
    #[serde(default)]
    pub providers: Vec<String>,

    #[serde(default)]
    pub published: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> NewJobRequest {
        NewJobRequest {
            name: name.to_string(),
            description: "Test description".to_string(),
            geometry: Geometry::from_bbox(-10.85, 6.25, -10.62, 6.40),
            formats: vec!["shp".to_string()],
            preset: None,
            translation: None,
            transform: None,
            providers: vec![],
            published: false,
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request("TestJob").validate().is_ok());

        let errors = request("").validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));

        let mut bad_geometry = request("TestJob");
        bad_geometry.geometry = Geometry::Polygon(vec![]);
        let errors = bad_geometry.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("geometry"));
    }

    #[test]
    fn test_blank_name_and_description_are_rejected() {
        let mut blank = request("   ");
        blank.description = "\t \n".to_string();
        let errors = blank.validate().unwrap_err();
        let fields = errors.field_errors();
        assert_eq!(fields["name"][0].code, "blank");
        assert_eq!(fields["description"][0].code, "blank");
    }

    #[test]
    fn test_request_defaults() {
        let parsed: NewJobRequest = serde_json::from_value(serde_json::json!({
            "name": "TestJob",
            "description": "Test description",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]]]
            }
        }))
        .unwrap();
        assert!(parsed.formats.is_empty());
        assert!(parsed.preset.is_none());
        assert!(!parsed.published);
    }

    #[test]
    fn test_tags_from_map() {
        let job_uid = Uuid::new_v4();
        let mut map = TagMap::new();
        map.insert("building".into(), vec![GeometryType::Polygon]);
        map.insert("amenity".into(), vec![GeometryType::Point, GeometryType::Polygon]);

        let tags = Tag::from_map(job_uid, &map);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name, "amenity");
        assert!(tags.iter().all(|t| t.job_uid == job_uid));
    }

    #[test]
    fn test_enum_round_trip_through_strings() {
        assert_eq!("POLYGON".parse::<GeometryType>().unwrap(), GeometryType::Polygon);
        assert_eq!(ConfigType::Translation.to_string(), "TRANSLATION");
        assert!("SCRIPT".parse::<ConfigType>().is_err());
    }
}
