pub mod definitions;
pub mod reports;
