use serde::{Deserialize, Serialize};

use crate::model::apperror::{ApplicationError, ErrorType};
use crate::pipeline::Document;

/**
 * A country with its yearly energy generation and monthly temperature records.
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Country {
    pub name: String,
    pub code: String,
    /**
     * Codes of the groups the country belongs to.
     */
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub years: Vec<YearRecord>,
}

/**
 * A group of countries (EU, G20, ...). `countries` holds member country codes.
 * The group's own `years` are aggregates reported for the group as a whole.
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub years: Vec<YearRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YearRecord {
    pub year: i64,
    #[serde(default)]
    pub energy_types: Vec<EnergyTypeRecord>,
    #[serde(default)]
    pub months: Vec<MonthRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyTypeRecord {
    #[serde(rename = "type")]
    pub energy_type: String,
    pub generation_value: f64,
    pub generation_unit: String,
    pub is_renewable: bool,
    #[serde(default)]
    pub emission_value: Option<f64>,
    #[serde(default)]
    pub emission_unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthRecord {
    #[serde(default)]
    pub month: Option<u8>,
    /**
     * Missing measurements are kept as `null` and skipped by the reports.
     */
    #[serde(default)]
    pub temperature_change: Option<f64>,
    #[serde(default)]
    pub standard_deviation: Option<f64>,
    pub unit: String,
}

/**
 * Both collections as read from the data store. An absent collection is empty.
 */
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Dataset {
    #[serde(default)]
    pub countries: Vec<Country>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Dataset {
    pub fn new(countries: Vec<Country>, groups: Vec<Group>) -> Self {
        Dataset { countries, groups }
    }

    pub fn country_documents(&self) -> Result<Vec<Document>, ApplicationError> {
        to_documents(&self.countries)
    }

    pub fn group_documents(&self) -> Result<Vec<Document>, ApplicationError> {
        to_documents(&self.groups)
    }
}

/**
 * Converts typed collection entries into pipeline rows.
 */
fn to_documents<T: Serialize>(entries: &[T]) -> Result<Vec<Document>, ApplicationError> {
    entries
        .iter()
        .map(|entry| match serde_json::to_value(entry) {
            Ok(serde_json::Value::Object(document)) => Ok(document),
            Ok(other) => Err(ApplicationError::new(ErrorType::InvalidExpression, format!("Collection entry is not a document: {other}"))),
            Err(err) => Err(ApplicationError::new(ErrorType::InvalidExpression, format!("Failed to convert collection entry: {err}"))),
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let dataset: Dataset = serde_json::from_str(
            r#"{"countries": [{"name": "Brazil", "code": "BRA", "years": [{"year": 2019, "energy_types": [{"type": "Hydro", "generation_value": 80.0, "generation_unit": "TWh", "is_renewable": true}]}]}]}"#,
        )
        .unwrap();
        assert!(dataset.groups.is_empty());
        let brazil = &dataset.countries[0];
        assert!(brazil.groups.is_empty());
        assert!(brazil.years[0].months.is_empty());
        assert_eq!(brazil.years[0].energy_types[0].energy_type, "Hydro");
        assert_eq!(brazil.years[0].energy_types[0].emission_value, None);
    }

    #[test]
    fn test_documents_keep_absent_values_as_null() {
        let country = Country {
            name: "Chile".to_string(),
            code: "CHL".to_string(),
            groups: vec!["OECD".to_string()],
            years: vec![YearRecord { year: 2019, energy_types: vec![], months: vec![MonthRecord { month: Some(1), temperature_change: None, standard_deviation: None, unit: "°C".to_string() }] }],
        };
        let documents = Dataset::new(vec![country], vec![]).country_documents().unwrap();
        let month = &documents[0]["years"][0]["months"][0];
        assert!(month.get("temperature_change").is_some());
        assert!(month["temperature_change"].is_null());
        assert_eq!(documents[0]["code"], "CHL");
    }
}
