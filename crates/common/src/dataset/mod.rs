//! City dataset
//!
//! The structured half of retrieval: a small list of city records read once
//! at startup and shared read-only for the lifetime of the process.

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One city in the dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRecord {
    pub name: String,

    /// State or region the city belongs to
    #[serde(alias = "state")]
    pub region: String,

    /// Average lodging cost per night
    #[serde(alias = "avg_hotel_cost", alias = "averageLodgingCost")]
    pub average_lodging_cost: f64,

    /// Average food cost per day
    #[serde(alias = "avg_food_cost", alias = "averageFoodCost")]
    pub average_food_cost: f64,

    /// Fuel cost per kilometre
    #[serde(
        default,
        alias = "fuel_cost_per_km",
        alias = "perDistanceUnitFuelCost"
    )]
    pub fuel_cost_per_km: f64,

    #[serde(default)]
    pub places: Vec<Place>,

    #[serde(default)]
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,

    #[serde(alias = "type", default)]
    pub category: String,

    #[serde(default)]
    pub rating: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(alias = "user", default)]
    pub author: String,

    #[serde(alias = "comment")]
    pub text: String,

    #[serde(default)]
    pub rating: f32,
}

/// Immutable, cheaply cloneable set of city records in file order
#[derive(Debug, Clone, Default)]
pub struct CityCatalog {
    records: Arc<[CityRecord]>,
}

impl CityCatalog {
    /// Build a catalog from records, keeping their order
    pub fn new(records: Vec<CityRecord>) -> Result<Self> {
        if let Some(index) = records.iter().position(|r| r.name.trim().is_empty()) {
            return Err(AppError::Dataset {
                message: format!("record {} has an empty city name", index),
            });
        }

        Ok(Self {
            records: records.into(),
        })
    }

    /// Parse a catalog from the JSON array format used by the dataset file
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<CityRecord> =
            serde_json::from_str(json).map_err(|e| AppError::Dataset {
                message: format!("invalid city dataset: {}", e),
            })?;
        Self::new(records)
    }

    /// Load the dataset file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| AppError::Dataset {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;

        let catalog = Self::from_json(&json)?;
        info!(path = %path.display(), cities = catalog.len(), "City dataset loaded");
        Ok(catalog)
    }

    pub fn records(&self) -> &[CityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "name": "Jaipur",
            "state": "Rajasthan",
            "avg_hotel_cost": 2500,
            "avg_food_cost": 600,
            "fuel_cost_per_km": 7.5,
            "places": [
                {"name": "Amber Fort", "type": "fort", "rating": 4.7},
                {"name": "Hawa Mahal", "type": "palace", "rating": 4.5}
            ],
            "reviews": [
                {"user": "asha", "comment": "Colourful and busy", "rating": 4}
            ]
        },
        {
            "name": "Goa",
            "region": "Goa",
            "average_lodging_cost": 3000,
            "average_food_cost": 800
        }
    ]"#;

    #[test]
    fn test_parse_source_field_names() {
        let catalog = CityCatalog::from_json(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 2);

        let jaipur = &catalog.records()[0];
        assert_eq!(jaipur.region, "Rajasthan");
        assert_eq!(jaipur.average_lodging_cost, 2500.0);
        assert_eq!(jaipur.places[0].category, "fort");
        assert_eq!(jaipur.reviews[0].author, "asha");
        assert_eq!(jaipur.reviews[0].text, "Colourful and busy");

        let goa = &catalog.records()[1];
        assert!(goa.places.is_empty());
        assert_eq!(goa.fuel_cost_per_km, 0.0);
    }

    #[test]
    fn test_order_is_preserved() {
        let catalog = CityCatalog::from_json(SAMPLE).unwrap();
        let names: Vec<_> = catalog.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Jaipur", "Goa"]);
    }

    #[test]
    fn test_empty_name_rejected() {
        let json = r#"[{"name": " ", "state": "X", "avg_hotel_cost": 1, "avg_food_cost": 1}]"#;
        let err = CityCatalog::from_json(json).unwrap_err();
        assert!(matches!(err, AppError::Dataset { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = CityCatalog::load("/definitely/not/here/cities.json").unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(CityCatalog::from_json("{not json").is_err());
    }
}
