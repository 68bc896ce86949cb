use std::str::FromStr;

use actix_web::{
    HttpRequest, HttpResponse, get,
    web::{self, Path},
};
use tracing::{Instrument, instrument};

use crate::{
    api::{
        rest::{ReportListResponse, ReportResponse},
        state::AppState,
    },
    model::{apperror::ApplicationError, reports::ReportType},
};

/**
 * Endpoint listing the reports that can be generated.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "listReports", trace_id = get_trace_id(&http_request)))]
#[get("/api/services/v1_0/reports")]
pub async fn reports_list(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    app_state.authorize(&http_request)?;
    Ok(HttpResponse::Ok().json(ReportListResponse::from(app_state.report_service.list_reports())))
}

/**
 * Endpoint generating a single report.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "getReport", trace_id = get_trace_id(&http_request), result))]
#[get("/api/services/v1_0/reports/{reportId}")]
pub async fn report_get(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.authorize(&http_request)?;
    let report_type = ReportType::from_str(&path.into_inner())?;
    let output = app_state.report_service.generate_report(report_type).instrument(span.clone()).await;
    app_state.record_execution(report_type, output.is_ok());
    match output {
        Ok(output) => {
            span.record("result", "ok");
            Ok(HttpResponse::Ok().json(ReportResponse::from(output)))
        }
        Err(err) => {
            span.record("result", "error");
            tracing::error!("Report {} failed: {}", report_type, err);
            Err(err)
        }
    }
}

/**
 * Retrieves the trace ID from the HTTP request headers.
 * If the trace ID is not present, a new UUID is generated.
 */
pub fn get_trace_id(http_request: &HttpRequest) -> String {
    http_request.headers().get("X-Trace-ID").and_then(|v| v.to_str().ok().map(std::string::ToString::to_string)).unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
