pub mod apperror;
pub mod climate;
pub mod config;
pub mod reports;
