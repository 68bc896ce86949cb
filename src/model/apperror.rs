use std::fmt;

/**
 * Represents the type of error that can occur within the application.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorType {
    Initialization,
    JwtAuthorization,
    DatabaseError,
    NotFound,
    /**
     * An expression referenced a field that is not present in the row.
     */
    FieldNotFound,
    /**
     * A pipeline divided by zero without guarding the divisor.
     */
    DivisionByZero,
    InvalidExpression,
}

/**
 * Represents an error that occurs within the application.
 */
#[derive(Debug, Clone)]
pub struct ApplicationError {
    /**
     * Error type.
     */
    pub error_type: ErrorType,
    /**
     * Error message describing problem.
     */
    pub message: String,
}

impl ApplicationError {
    /**
     * Creates a new ApplicationError.
     *
     * #Arguments
     * `error_type`: The type of error.
     * `message`: A description of the error.
     */
    pub fn new(error_type: ErrorType, message: String) -> Self {
        ApplicationError { error_type, message }
    }

    /**
     * Shorthand for a missing field in a pipeline row.
     */
    pub fn field_not_found(path: &str) -> Self {
        ApplicationError::new(ErrorType::FieldNotFound, format!("Field not found: {path}"))
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApplicationError {}

impl From<ApplicationError> for std::io::Error {
    fn from(err: ApplicationError) -> Self {
        std::io::Error::other(format!("{:?}: {}", err.error_type, err.message))
    }
}
