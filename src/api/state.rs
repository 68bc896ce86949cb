use prometheus::IntCounterVec;

use crate::{
    api::security::JwtSecurityService,
    model::{apperror::ApplicationError, reports::ReportType},
    service::reports::ReportService,
};

/**
* Represents the application state shared across the Actix web application.
*/
pub struct AppState {
    /**
     * JWT validation. The report endpoints are open when not configured.
     */
    pub jwt_service: Option<JwtSecurityService>,
    /**
     * The report service producing the climate reports.
     */
    pub report_service: ReportService,
    /**
     * Report executions by report identifier and outcome.
     */
    pub report_executions: IntCounterVec,
}

impl AppState {
    /**
     * Creates a new instance of `AppState`.
     *
     * # Arguments
     * `jwt_service`: Optional JWT security service.
     * `report_service`: The report service.
     * `report_executions`: Counter registered with the metrics registry.
     */
    pub fn new(jwt_service: Option<JwtSecurityService>, report_service: ReportService, report_executions: IntCounterVec) -> Self {
        AppState { jwt_service, report_service, report_executions }
    }

    /**
     * Validates the bearer token when JWT security is configured.
     */
    pub fn authorize(&self, http_request: &actix_web::HttpRequest) -> Result<(), ApplicationError> {
        if let Some(jwt_service) = &self.jwt_service {
            let claim = jwt_service.validate(http_request)?;
            tracing::debug!("Authorized subject {:?}", claim.sub);
        }
        Ok(())
    }

    pub fn record_execution(&self, report_type: ReportType, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.report_executions.with_label_values(&[report_type.identifier(), outcome]).inc();
    }
}

/**
 * Creates the report execution counter.
 */
pub fn report_executions_counter() -> Result<IntCounterVec, prometheus::Error> {
    IntCounterVec::new(prometheus::Opts::new("report_executions", "Number of report executions"), &["report", "outcome"])
}
