use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use validator::ValidationError;

/// Rayon de la sphère utilisée par EPSG:3857 (mètres)
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude maximale représentable en web mercator
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Position GeoJSON `[lon, lat]` en EPSG:4326
pub type Position = [f64; 2];

/// Anneau linéaire fermé
pub type Ring = Vec<Position>;

/// Emprise d'un job, au format GeoJSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

impl Geometry {
    /// Polygone rectangulaire à partir d'une bbox (xmin, ymin, xmax, ymax)
    pub fn from_bbox(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Geometry::Polygon(vec![vec![
            [xmin, ymin],
            [xmin, ymax],
            [xmax, ymax],
            [xmax, ymin],
            [xmin, ymin],
        ]])
    }

    /// Liste des polygones (anneau extérieur en premier)
    pub fn polygons(&self) -> Vec<&[Ring]> {
        match self {
            Geometry::Polygon(rings) => vec![rings.as_slice()],
            Geometry::MultiPolygon(polygons) => polygons.iter().map(|p| p.as_slice()).collect(),
        }
    }

    /// Anneau extérieur du premier polygone
    pub fn outer_ring(&self) -> Option<&Ring> {
        self.polygons().into_iter().next().and_then(|rings| rings.first())
    }

    /// Surface projetée en EPSG:3857, en m²
    pub fn webmercator_area_m2(&self) -> f64 {
        self.polygons()
            .into_iter()
            .map(|rings| {
                let mut rings = rings.iter();
                let outer = rings.next().map(|r| ring_area(r)).unwrap_or(0.0);
                let holes: f64 = rings.map(|r| ring_area(r)).sum();
                (outer - holes).max(0.0)
            })
            .sum()
    }

    /// Sérialisation GeoJSON
    pub fn to_geojson(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Projection web mercator d'une position
fn project(position: &Position) -> (f64, f64) {
    let lon = position[0].to_radians();
    let lat = position[1]
        .clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT)
        .to_radians();
    let x = WEB_MERCATOR_RADIUS * lon;
    let y = WEB_MERCATOR_RADIUS * (PI / 4.0 + lat / 2.0).tan().ln();
    (x, y)
}

/// Formule du lacet sur l'anneau projeté
fn ring_area(ring: &Ring) -> f64 {
    let projected: Vec<(f64, f64)> = ring.iter().map(project).collect();
    let twice_area: f64 = projected
        .windows(2)
        .map(|pair| pair[0].0 * pair[1].1 - pair[1].0 * pair[0].1)
        .sum();
    twice_area.abs() / 2.0
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Valide l'emprise d'un job
pub fn validate_geometry(geometry: &Geometry) -> Result<(), ValidationError> {
    let polygons = geometry.polygons();
    if polygons.is_empty() || polygons.iter().any(|rings| rings.is_empty()) {
        return Err(invalid("geometry", "La géométrie doit contenir au moins un polygone"));
    }

    for ring in polygons.iter().flat_map(|rings| rings.iter()) {
        if ring.len() < 4 {
            return Err(invalid("geometry", "Chaque anneau doit contenir au moins 4 positions"));
        }
        if ring.first() != ring.last() {
            return Err(invalid("geometry", "Les anneaux doivent être fermés"));
        }
        for [lon, lat] in ring {
            if !(-180.0..=180.0).contains(lon) || !(-90.0..=90.0).contains(lat) {
                return Err(invalid("geometry", "Coordonnées hors de l'emprise EPSG:4326"));
            }
        }
    }

    if geometry.webmercator_area_m2() <= 0.0 {
        return Err(invalid("geometry", "La géométrie doit avoir une surface non nulle"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geojson_shape() {
        let geometry = Geometry::from_bbox(-10.85, 6.25, -10.62, 6.40);
        let value: serde_json::Value = serde_json::from_str(&geometry.to_geojson()).unwrap();
        assert_eq!(value["type"], "Polygon");
        assert_eq!(value["coordinates"][0].as_array().unwrap().len(), 5);

        let parsed: Geometry = serde_json::from_value(serde_json::json!({
            "type": "MultiPolygon",
            "coordinates": [[[[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]]]]
        }))
        .unwrap();
        assert_eq!(parsed.polygons().len(), 1);
    }

    #[test]
    fn test_webmercator_area_of_one_degree_at_equator() {
        let geometry = Geometry::from_bbox(0.0, 0.0, 1.0, 1.0);
        let side = WEB_MERCATOR_RADIUS * 1f64.to_radians();
        let area = geometry.webmercator_area_m2();
        // 1° de latitude près de l'équateur est à peine plus grand qu'en longitude
        assert!(area > side * side);
        assert!(area < side * side * 1.001);
    }

    #[test]
    fn test_holes_are_subtracted() {
        let geometry = Geometry::Polygon(vec![
            vec![[0.0, 0.0], [0.0, 2.0], [2.0, 2.0], [2.0, 0.0], [0.0, 0.0]],
            vec![[0.5, 0.5], [0.5, 1.5], [1.5, 1.5], [1.5, 0.5], [0.5, 0.5]],
        ]);
        let outer = Geometry::from_bbox(0.0, 0.0, 2.0, 2.0).webmercator_area_m2();
        let hole = Geometry::from_bbox(0.5, 0.5, 1.5, 1.5).webmercator_area_m2();
        assert!((geometry.webmercator_area_m2() - (outer - hole)).abs() < 1.0);
    }

    #[test]
    fn test_validate_geometry() {
        assert!(validate_geometry(&Geometry::from_bbox(-10.85, 6.25, -10.62, 6.40)).is_ok());

        let open_ring = Geometry::Polygon(vec![vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]]]);
        assert!(validate_geometry(&open_ring).is_err());

        let out_of_range = Geometry::from_bbox(170.0, 0.0, 190.0, 1.0);
        assert!(validate_geometry(&out_of_range).is_err());

        let flat = Geometry::from_bbox(1.0, 1.0, 1.0, 1.0);
        assert!(validate_geometry(&flat).is_err());
    }
}
