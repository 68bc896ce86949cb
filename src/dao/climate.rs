use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use sqlx::types::Json;
use sqlx::{PgConnection, Pool, Postgres};
use tracing::{Instrument, instrument};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    climate::{Country, Dataset, Group},
    reports::Collection,
};

/**
 * SQL query to retrieve all country documents.
 */
const QUERY_COUNTRIES: &str = "SELECT document FROM countries ORDER BY id";

/**
 * SQL query to retrieve all group documents.
 */
const QUERY_GROUPS: &str = "SELECT document FROM groups ORDER BY id";

/**
 * SQLSTATE for a table that does not exist.
 */
const UNDEFINED_TABLE: &str = "42P01";

/**
 * Where the read-only collections live.
 */
pub enum DataStore {
    /**
     * One JSONB document table per collection.
     */
    Postgresql(Pool<Postgres>),
    /**
     * A JSON file holding both collections.
     */
    JsonFile(PathBuf),
}

/**
 * DAO for reading the countries and groups collections.
 */
pub struct ClimateDao {}

impl ClimateDao {
    /**
     * Creates a new instance of `ClimateDao`.
     *
     * # Returns
     * A new instance of `ClimateDao`.
     */
    pub fn new() -> Self {
        ClimateDao {}
    }

    /**
     * Reads the requested collections from the data store. Collections not requested are left empty.
     *
     * # Arguments
     * `data_store`: The store holding the collections.
     * `collections`: The collections the caller needs.
     *
     * # Returns
     * A Result containing the `Dataset` or an `ApplicationError`.
     */
    #[instrument(skip(self, data_store), fields(countries, groups))]
    pub async fn get_dataset(&self, data_store: &DataStore, collections: &[Collection]) -> Result<Dataset, ApplicationError> {
        let span = tracing::Span::current();
        let dataset = match data_store {
            DataStore::Postgresql(connection_pool) => {
                let mut connection = connection_pool.acquire().instrument(span.clone()).await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to acquire connection: {err}")))?;
                let countries = if collections.contains(&Collection::Countries) { self.get_countries(&mut connection).instrument(span.clone()).await? } else { vec![] };
                let groups = if collections.contains(&Collection::Groups) { self.get_groups(&mut connection).instrument(span.clone()).await? } else { vec![] };
                Dataset::new(countries, groups)
            }
            DataStore::JsonFile(path) => {
                let dataset = self.read_dataset_file(path).instrument(span.clone()).await?;
                let countries = if collections.contains(&Collection::Countries) { dataset.countries } else { vec![] };
                let groups = if collections.contains(&Collection::Groups) { dataset.groups } else { vec![] };
                Dataset::new(countries, groups)
            }
        };
        span.record("countries", dataset.countries.len());
        span.record("groups", dataset.groups.len());
        Ok(dataset)
    }

    /**
     * Retrieves every country document.
     *
     * # Arguments
     * `connection`: The database connection.
     *
     * # Returns
     * A Result containing the countries or an `ApplicationError`.
     */
    #[instrument(skip(self, connection))]
    pub async fn get_countries(&self, connection: &mut PgConnection) -> Result<Vec<Country>, ApplicationError> {
        Self::fetch_collection(connection, QUERY_COUNTRIES, Collection::Countries).await
    }

    /**
     * Retrieves every group document.
     *
     * # Arguments
     * `connection`: The database connection.
     *
     * # Returns
     * A Result containing the groups or an `ApplicationError`.
     */
    #[instrument(skip(self, connection))]
    pub async fn get_groups(&self, connection: &mut PgConnection) -> Result<Vec<Group>, ApplicationError> {
        Self::fetch_collection(connection, QUERY_GROUPS, Collection::Groups).await
    }

    /**
     * Reads a dataset file containing `countries` and `groups` arrays.
     *
     * # Arguments
     * `path`: Path to the JSON file.
     *
     * # Returns
     * A Result containing the `Dataset` or an `ApplicationError`.
     */
    #[instrument(skip(self))]
    pub async fn read_dataset_file(&self, path: &Path) -> Result<Dataset, ApplicationError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to read dataset file {}: {err}", path.display())))?;
        serde_json::from_str(&contents).map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to parse dataset file {}: {err}", path.display())))
    }

    async fn fetch_collection<T>(connection: &mut PgConnection, query: &'static str, collection: Collection) -> Result<Vec<T>, ApplicationError>
    where
        T: DeserializeOwned + Send + Unpin + 'static,
    {
        let span = tracing::Span::current();
        let results: Result<Vec<(Json<T>,)>, sqlx::Error> = sqlx::query_as(query).fetch_all(connection).instrument(span).await;
        match results {
            Ok(rows) => Ok(rows.into_iter().map(|(document,)| document.0).collect()),
            Err(err) => Self::handle_database_error(&err, collection),
        }
    }

    /**
     * Maps database errors to application errors. A missing table is an empty collection.
     *
     * # Arguments
     * `error`: The database error to handle.
     * `collection`: The collection being read.
     *
     * # Returns
     * An empty collection for a missing table, otherwise an `ApplicationError`.
     */
    fn handle_database_error<T>(error: &sqlx::Error, collection: Collection) -> Result<Vec<T>, ApplicationError> {
        if let Some(db_error) = error.as_database_error() {
            if db_error.code().as_deref() == Some(UNDEFINED_TABLE) {
                tracing::warn!("Collection {} does not exist, treating it as empty", collection.name());
                return Ok(vec![]);
            }
            tracing::error!("Unhandled database error reading {}: {}", collection.name(), db_error);
            return Err(ApplicationError::new(ErrorType::DatabaseError, format!("Failed to read collection {}", collection.name())));
        }
        Err(ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get {}: {error}", collection.name())))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_dataset(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("climate_dao_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[actix_web::test]
    async fn test_read_dataset_file() {
        let path = write_dataset(r#"{"countries": [{"name": "Brazil", "code": "BRA"}], "groups": [{"name": "G20", "code": "G20", "countries": ["BRA"]}]}"#);
        let dataset = ClimateDao::new().get_dataset(&DataStore::JsonFile(path.clone()), &[Collection::Countries, Collection::Groups]).await.unwrap();
        assert_eq!(dataset.countries.len(), 1);
        assert_eq!(dataset.groups[0].countries, vec!["BRA".to_string()]);
        std::fs::remove_file(path).unwrap();
    }

    #[actix_web::test]
    async fn test_read_only_requested_collections() {
        let path = write_dataset(r#"{"countries": [{"name": "Brazil", "code": "BRA"}], "groups": [{"name": "G20", "code": "G20"}]}"#);
        let dataset = ClimateDao::new().get_dataset(&DataStore::JsonFile(path.clone()), &[Collection::Groups]).await.unwrap();
        assert!(dataset.countries.is_empty());
        assert_eq!(dataset.groups.len(), 1);
        std::fs::remove_file(path).unwrap();
    }

    #[actix_web::test]
    async fn test_absent_collection_is_empty() {
        let path = write_dataset(r#"{"countries": []}"#);
        let dataset = ClimateDao::new().get_dataset(&DataStore::JsonFile(path.clone()), &[Collection::Countries, Collection::Groups]).await.unwrap();
        assert!(dataset.countries.is_empty());
        assert!(dataset.groups.is_empty());
        std::fs::remove_file(path).unwrap();
    }

    #[actix_web::test]
    async fn test_missing_dataset_file() {
        let path = std::env::temp_dir().join("climate_dao_does_not_exist.json");
        let err = ClimateDao::new().read_dataset_file(&path).await.unwrap_err();
        assert_eq!(err.error_type, ErrorType::DatabaseError);
    }
}
