use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::geometry::Geometry;

/// Source de données amont (ex: OSM)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProvider {
    pub uid: Uuid,
    pub name: String,
    pub slug: String,
    /// Taille moyenne produite par unité d'entrée (Go/feature ou Go/km²)
    pub size_estimate_constant: Option<f64>,
}

impl DataProvider {
    pub fn new(name: &str, slug: &str) -> Self {
        Self {
            uid: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            size_estimate_constant: None,
        }
    }
}

/// Fichier produit par une tâche; `size` en Mo
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FileProducingTaskResult {
    pub size: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTaskRecord {
    pub uid: Uuid,
    pub name: String,
    pub result: Option<FileProducingTaskResult>,
}

impl ExportTaskRecord {
    pub fn new(name: &str, size: Option<f64>) -> Self {
        Self {
            uid: Uuid::new_v4(),
            name: name.to_string(),
            result: Some(FileProducingTaskResult { size }),
        }
    }

    /// Tâche sans fichier produit
    pub fn pending(name: &str) -> Self {
        Self {
            uid: Uuid::new_v4(),
            name: name.to_string(),
            result: None,
        }
    }
}

/// Tâches d'un run pour un fournisseur donné
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProviderTaskRecord {
    pub uid: Uuid,
    pub run_uid: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<ExportTaskRecord>,
}

impl DataProviderTaskRecord {
    pub fn new(run_uid: Uuid, name: &str, slug: &str, tasks: Vec<ExportTaskRecord>) -> Self {
        Self {
            uid: Uuid::new_v4(),
            run_uid,
            name: name.to_string(),
            slug: slug.to_string(),
            created_at: Utc::now(),
            tasks,
        }
    }
}

/// Run terminé et l'emprise de son job
#[derive(Debug, Clone)]
pub struct RunFootprint {
    pub run_uid: Uuid,
    pub geometry: Geometry,
}
