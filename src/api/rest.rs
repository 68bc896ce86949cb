use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    reports::{ReportOutput, ReportType},
};
use crate::pipeline::Document;

/***************** Reports:list models *********************/

/**
 * Response structure for listing the available reports.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListResponse {
    reports: Vec<ReportSummaryElement>,
}

impl From<&[ReportType]> for ReportListResponse {
    fn from(report_types: &[ReportType]) -> Self {
        ReportListResponse { reports: report_types.iter().map(|report_type| ReportSummaryElement::from(*report_type)).collect() }
    }
}

/**
 * A report that can be requested by its identifier.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummaryElement {
    /**
     * Identifier used in the report path.
     */
    id: &'static str,
    description: &'static str,
}

impl From<ReportType> for ReportSummaryElement {
    fn from(report_type: ReportType) -> Self {
        ReportSummaryElement { id: report_type.identifier(), description: report_type.description() }
    }
}

/***************** Reports:get models *********************/

/**
 * Response structure for a generated report.
 *
 * Rows keep the field order produced by the report pipeline.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    report: &'static str,
    generated_at: DateTime<Utc>,
    rows: Vec<Document>,
}

/**
 * Converts from ReportOutput to ReportResponse.
 */
impl From<ReportOutput> for ReportResponse {
    fn from(output: ReportOutput) -> Self {
        ReportResponse { report: output.report_type.identifier(), generated_at: output.generated_at, rows: output.rows }
    }
}

/***************** Error models *********************/

/**
 * Custom error response for the application.
 */
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /**
     * The error code associated with the error type.
     */
    pub code: u16,
    /**
     * A human-readable message describing the error.
     */
    pub message: String,
}

impl ResponseError for ApplicationError {
    fn status_code(&self) -> StatusCode {
        get_statuscode(&self.error_type)
    }

    /**
     * Generates an error response for the application error.
     */
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse { code: get_error_code(&self.error_type), message: self.message.clone() };
        HttpResponse::build(get_statuscode(&self.error_type)).json(&error_response)
    }
}

/**
* Maps application errors to HTTP status codes.
*
* # Arguments
* `application_error`: The type of error that occurred.
*
* # Returns
* The corresponding HTTP status code.
*/
fn get_statuscode(application_error: &ErrorType) -> StatusCode {
    match application_error {
        ErrorType::JwtAuthorization => StatusCode::UNAUTHORIZED,
        ErrorType::NotFound => StatusCode::NOT_FOUND,
        ErrorType::Initialization | ErrorType::DatabaseError | ErrorType::FieldNotFound | ErrorType::DivisionByZero | ErrorType::InvalidExpression => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/**
 * Maps application errors to error codes.
 *
 * # Arguments
 * `application_error`: The type of error that occurred.
 *
 * # Returns
 * The corresponding error code.
 */
fn get_error_code(application_error: &ErrorType) -> u16 {
    match application_error {
        ErrorType::JwtAuthorization => 1000,
        ErrorType::Initialization => 1001,
        ErrorType::NotFound => 1002,
        ErrorType::DatabaseError => 1003,
        ErrorType::FieldNotFound => 1004,
        ErrorType::DivisionByZero => 1005,
        ErrorType::InvalidExpression => 1006,
    }
}
