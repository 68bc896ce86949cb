use sqlx::{Pool, Postgres};
use tracing::{Instrument, instrument};

use crate::{
    dao::climate::{ClimateDao, DataStore},
    model::{
        apperror::ApplicationError,
        reports::{ReportOutput, ReportType},
    },
    service::definitions,
};

/**
 * Represents the service producing the climate reports.
 */
pub struct ReportService {
    /**
     * The DAO reading the collections.
     */
    climate_dao: ClimateDao,
    /**
     * Where the collections are read from. Collections are read again for every report.
     */
    data_store: DataStore,
}

impl ReportService {
    /**
     * Creates a new instance of `ReportService`.
     *
     * # Arguments
     * `climate_dao`: The DAO for reading collections.
     * `data_store`: The data store holding the collections.
     *
     * # Returns
     * A new instance of `ReportService`.
     */
    pub fn new(climate_dao: ClimateDao, data_store: DataStore) -> Self {
        ReportService { climate_dao, data_store }
    }

    /**
     * Reads the collections a report needs and runs its pipeline.
     *
     * # Arguments
     * `report_type`: The report to generate.
     *
     * # Returns
     * A Result containing the `ReportOutput` or an `ApplicationError`.
     */
    #[instrument(skip(self), fields(report = %report_type, rows))]
    pub async fn generate_report(&self, report_type: ReportType) -> Result<ReportOutput, ApplicationError> {
        let span = tracing::Span::current();
        let dataset = self.climate_dao.get_dataset(&self.data_store, report_type.collections()).instrument(span.clone()).await?;
        let rows = span.in_scope(|| definitions::assemble(report_type, &dataset))?;
        span.record("rows", rows.len());
        tracing::info!("Generated report {} with {} rows", report_type, rows.len());
        Ok(ReportOutput::new(report_type, rows))
    }

    /**
     * Lists the reports that can be generated.
     */
    pub fn list_reports(&self) -> &'static [ReportType] {
        &ReportType::ALL
    }

    /**
     * The database pool when the collections live in Postgres. Used for pool metrics.
     */
    pub fn connection_pool(&self) -> Option<&Pool<Postgres>> {
        match &self.data_store {
            DataStore::Postgresql(connection_pool) => Some(connection_pool),
            DataStore::JsonFile(_) => None,
        }
    }
}
