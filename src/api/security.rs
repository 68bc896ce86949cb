use std::str::FromStr;

use actix_web::{FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    config::JwtConfig,
};

#[derive(Debug, Deserialize)]
pub struct Claim {
    pub sub: Option<String>,
    pub name: Option<String>,
}

/**
 * JWT Security Service guarding the report endpoints.
 */
#[derive(Clone)]
pub struct JwtSecurityService {
    /**
     * The decoding key used to verify JWT tokens.
     */
    decoding_key: DecodingKey,
    /**
     * The validation rules for JWT tokens.
     */
    validation: Validation,
}

impl JwtSecurityService {
    /**
     * Creates a new instance of JwtSecurityService.
     *
     * # Arguments
     * `public_key`: The public key, or the shared secret for HS algorithms.
     * `algorithm`: The algorithm used for JWT token validation.
     *
     * # Returns
     * A Result containing the JwtSecurityService or an ApplicationError if initialization fails.
     */
    pub fn new(public_key: &str, algorithm: &str) -> Result<Self, ApplicationError> {
        let algorithm = Algorithm::from_str(algorithm).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Invalid algorithm: {err}")))?;
        let key_error = |err: jsonwebtoken::errors::Error| ApplicationError::new(ErrorType::Initialization, format!("Failed to create decoding key: {err}"));
        let decoding_key = match algorithm {
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 | Algorithm::PS256 | Algorithm::PS384 | Algorithm::PS512 => DecodingKey::from_rsa_pem(public_key.as_bytes()).map_err(key_error)?,
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(public_key.as_bytes()).map_err(key_error)?,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => DecodingKey::from_secret(public_key.as_bytes()),
            Algorithm::EdDSA => DecodingKey::from_ed_pem(public_key.as_bytes()).map_err(key_error)?,
        };
        Ok(JwtSecurityService { decoding_key, validation: Validation::new(algorithm) })
    }

    /**
     * Creates the service from the security configuration, reading the key file.
     *
     * # Arguments
     * `jwt_config`: Key file path and algorithm.
     *
     * # Returns
     * A Result containing the JwtSecurityService or an ApplicationError if the key cannot be read.
     */
    pub fn from_config(jwt_config: &JwtConfig) -> Result<Self, ApplicationError> {
        let public_key = std::fs::read_to_string(&jwt_config.public_key_file)
            .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read key file {}: {err}", jwt_config.public_key_file)))?;
        JwtSecurityService::new(public_key.trim_end(), &jwt_config.algorithm)
    }

    /**
     * Validates the JWT token from the HTTP request.
     *
     * # Arguments
     * `http_request`: The HTTP request containing the JWT token in the Authorization header.
     *
     * # Returns
     * The token claims or an ApplicationError if validation fails.
     */
    pub fn validate(&self, http_request: &HttpRequest) -> Result<Claim, ApplicationError> {
        let credentials = BearerAuth::from_request(http_request, &mut actix_web::dev::Payload::None).into_inner().ok();
        let Some(credentials) = credentials else {
            return Err(ApplicationError::new(ErrorType::JwtAuthorization, "Unauthorized".to_string()));
        };
        match jsonwebtoken::decode::<Claim>(credentials.token(), &self.decoding_key, &self.validation) {
            Ok(token_data) => Ok(token_data.claims),
            Err(err) => {
                tracing::warn!("JWT validation error: {err}");
                Err(ApplicationError::new(ErrorType::JwtAuthorization, "Unauthorized".to_string()))
            }
        }
    }
}
