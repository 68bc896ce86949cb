use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::model::apperror::{ApplicationError, ErrorType};
use crate::pipeline::Document;

/**
 * Collections a report reads from the data store.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Countries,
    Groups,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Countries => "countries",
            Collection::Groups => "groups",
        }
    }
}

/**
 * The named reports the assembler can produce.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    RenewableShareByGroup,
    TopTemperatureChange,
    EnergyDiversityByGroup,
    CountrySummary,
}

impl ReportType {
    pub const ALL: [ReportType; 4] = [ReportType::RenewableShareByGroup, ReportType::TopTemperatureChange, ReportType::EnergyDiversityByGroup, ReportType::CountrySummary];

    pub fn identifier(self) -> &'static str {
        match self {
            ReportType::RenewableShareByGroup => "renewable-share-by-group",
            ReportType::TopTemperatureChange => "top-temperature-change",
            ReportType::EnergyDiversityByGroup => "energy-diversity-by-group",
            ReportType::CountrySummary => "country-summary",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ReportType::RenewableShareByGroup => "Renewable generation percentage of every member country, per group",
            ReportType::TopTemperatureChange => "Ten countries with the largest summed temperature change in 2019",
            ReportType::EnergyDiversityByGroup => "Five groups with the most distinct energy types in 2019",
            ReportType::CountrySummary => "Generation totals, renewable share and mean temperature change per country",
        }
    }

    pub fn collections(self) -> &'static [Collection] {
        match self {
            ReportType::RenewableShareByGroup => &[Collection::Groups, Collection::Countries],
            ReportType::TopTemperatureChange | ReportType::CountrySummary => &[Collection::Countries],
            ReportType::EnergyDiversityByGroup => &[Collection::Groups],
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl FromStr for ReportType {
    type Err = ApplicationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .into_iter()
            .find(|report_type| report_type.identifier() == value)
            .ok_or_else(|| ApplicationError::new(ErrorType::NotFound, format!("Unknown report: {value}")))
    }
}

/**
 * Result of one report invocation.
 */
#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub report_type: ReportType,
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<Document>,
}

impl ReportOutput {
    pub fn new(report_type: ReportType, rows: Vec<Document>) -> Self {
        ReportOutput { report_type, generated_at: Utc::now(), rows }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_report_type_from_identifier() {
        for report_type in ReportType::ALL {
            assert_eq!(ReportType::from_str(report_type.identifier()).unwrap(), report_type);
        }
    }

    #[test]
    fn test_report_type_unknown() {
        let err = ReportType::from_str("consulta01").unwrap_err();
        assert_eq!(err.error_type, ErrorType::NotFound);
    }
}
