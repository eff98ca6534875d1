//! Structured lookup over the city catalog

use crate::dataset::CityRecord;

/// Cities mentioned by `query`, best guess first.
///
/// Substring hits on the city or region name win outright and keep dataset
/// order. Only when there are none is the query split into tokens and
/// compared against city names exactly.
pub fn match_cities<'a>(query: &str, records: &'a [CityRecord]) -> Vec<&'a CityRecord> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }

    let substring_hits: Vec<&CityRecord> = records
        .iter()
        .filter(|record| {
            contains_name(&query, &record.name) || contains_name(&query, &record.region)
        })
        .collect();
    if !substring_hits.is_empty() {
        return substring_hits;
    }

    let tokens: Vec<&str> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    records
        .iter()
        .filter(|record| {
            let name = record.name.trim().to_lowercase();
            tokens.iter().any(|token| *token == name)
        })
        .collect()
}

/// First element of [`match_cities`]; later matches are ignored downstream
pub fn best_match<'a>(query: &str, records: &'a [CityRecord]) -> Option<&'a CityRecord> {
    match_cities(query, records).into_iter().next()
}

// An empty name would be a substring of every query
fn contains_name(query: &str, name: &str) -> bool {
    let name = name.trim().to_lowercase();
    !name.is_empty() && query.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city(name: &str, region: &str) -> CityRecord {
        CityRecord {
            name: name.to_string(),
            region: region.to_string(),
            average_lodging_cost: 2000.0,
            average_food_cost: 600.0,
            fuel_cost_per_km: 8.0,
            places: vec![],
            reviews: vec![],
        }
    }

    fn catalog() -> Vec<CityRecord> {
        vec![
            city("Jaipur", "Rajasthan"),
            city("Udaipur", "Rajasthan"),
            city("Goa", "Goa"),
            city("Manali", "Himachal Pradesh"),
        ]
    }

    #[test]
    fn test_exact_name_is_first() {
        let records = catalog();
        for record in &records {
            let query = format!("what should I eat in {} tonight", record.name);
            let hits = match_cities(&query, &records);
            assert_eq!(hits[0].name, record.name);
        }
    }

    #[test]
    fn test_case_insensitive_substring() {
        let records = catalog();
        let hits = match_cities("3 days in JAIPUR under budget", &records);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Jaipur");
    }

    #[test]
    fn test_region_match_keeps_dataset_order() {
        let records = catalog();
        let hits = match_cities("a week across rajasthan", &records);
        let names: Vec<&str> = hits.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Jaipur", "Udaipur"]);
        assert_eq!(best_match("a week across rajasthan", &records).unwrap().name, "Jaipur");
    }

    #[test]
    fn test_name_inside_longer_word_matches() {
        let records = vec![city("Ooty", "Tamil Nadu"), city("Puri", "Odisha")];
        let hits = match_cities("temples near puri's beach", &records);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Puri");
    }

    #[test]
    fn test_empty_region_never_matches_everything() {
        let records = vec![city("Leh", "")];
        assert!(match_cities("beaches in kerala", &records).is_empty());
    }

    #[test]
    fn test_no_match_and_empty_query() {
        let records = catalog();
        assert!(match_cities("how do visas work", &records).is_empty());
        assert!(match_cities("", &records).is_empty());
        assert!(match_cities("   ", &records).is_empty());
        assert!(best_match("", &records).is_none());
    }
}
