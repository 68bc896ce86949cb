mod api;
mod dao;
mod model;
mod pipeline;
mod service;

use std::fs::File;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::api::endpoints::{report_get, reports_list};
use crate::api::middleware::timing_middleware;
use crate::api::security::JwtSecurityService;
use crate::api::state::{AppState, report_executions_counter};
use crate::dao::climate::{ClimateDao, DataStore};
use crate::model::apperror::{ApplicationError, ErrorType};
use crate::model::config::{ApplicationArguments, Config, DatabaseType, HttpsConfig, LoggingConfig};
use crate::model::reports::ReportType;
use crate::service::reports::ReportService;

use actix_web::middleware::from_fn;
use actix_web::{App, HttpServer, web};
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use clap::Parser;
use prometheus::IntGauge;
use prometheus::core::Collector;
use rustls::pki_types::PrivateKeyDer;
use rustls::{ServerConfig, SupportedProtocolVersion};
use rustls_pemfile::{certs, pkcs8_private_keys};
use sqlx::{Pool, Postgres, pool};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = ApplicationArguments::parse();

    let config = get_config(&args.config_file)?;

    init_tracing(&config.logging)?;

    let data_store = get_data_store(&config.database.db_type).await?;
    let report_service = ReportService::new(ClimateDao::new(), data_store);

    if let Some(report) = &args.report {
        return print_report(&report_service, report).await;
    }

    let jwt_service = match &config.security.jwt {
        Some(jwt_config) => Some(JwtSecurityService::from_config(jwt_config)?),
        None => {
            tracing::warn!("No JWT configuration, report endpoints are unauthenticated");
            None
        }
    };

    let prometheus = PrometheusMetricsBuilder::new("")
        .endpoint("/metrics")
        .mask_unmatched_patterns("UNKNOWN")
        .build()
        .map_err(|err| std::io::Error::other(format!("Failed to create Prometheus metrics: {err}")))?;

    let report_executions = report_executions_counter().map_err(|err| std::io::Error::other(format!("Failed to create report_executions counter: {err}")))?;
    register_prometheus_metrics(&prometheus, &report_executions)?;

    if let Some(connection_pool) = report_service.connection_pool() {
        // Initialize connection pool metrics
        let max_connections_gauge = IntGauge::new("max_connections", "Connection pool maximum").map_err(|err| std::io::Error::other(format!("Failed to create max_connections gauge: {err}")))?;
        let active_connections_gauge = IntGauge::new("active_connections", "Connection pool active").map_err(|err| std::io::Error::other(format!("Failed to create active_connections gauge: {err}")))?;
        let idle_connections_gauge = IntGauge::new("idle_connections", "Connection pool idle").map_err(|err| std::io::Error::other(format!("Failed to create idle_connections gauge: {err}")))?;
        register_prometheus_metrics(&prometheus, &max_connections_gauge)?;
        register_prometheus_metrics(&prometheus, &active_connections_gauge)?;
        register_prometheus_metrics(&prometheus, &idle_connections_gauge)?;
        gather_db_metrics(max_connections_gauge, active_connections_gauge, idle_connections_gauge, connection_pool.clone());
    }

    let state = web::Data::new(AppState::new(jwt_service, report_service, report_executions));

    let server_init = HttpServer::new(move || {
        App::new()
            .wrap(prometheus.clone())
            .wrap(from_fn(timing_middleware))
            .app_data(state.clone())
            .service(reports_list)
            .service(report_get)
    });

    let server_init = if let Some(http_port) = &config.server.http_port { server_init.bind(("127.0.0.1", *http_port))? } else { server_init };
    let server_init = if let Some(https_config) = &config.server.https_config {
        let ssl_builder = ssl_builder(https_config).map_err(|err| std::io::Error::other(format!("Failed to create SSL/TLS configuration: {err}")))?;
        server_init.bind_rustls_0_23(("127.0.0.1", https_config.port), ssl_builder).map_err(|err| std::io::Error::other(format!("Failed to bind HTTPS server: {err}")))?
    } else {
        server_init
    };

    tracing::info!("Starting server with {} workers", config.server.workers);
    server_init.workers(config.server.workers).run().await
}

/**
 * Generates one report and prints its rows as JSON to stdout.
 *
 * #Arguments
 * `report_service`: The report service.
 * `report`: Identifier of the report.
 *
 * #Returns
 * A `Result` indicating success or failure.
 */
async fn print_report(report_service: &ReportService, report: &str) -> Result<(), std::io::Error> {
    let report_type = ReportType::from_str(report)?;
    let output = report_service.generate_report(report_type).await?;
    let json = serde_json::to_string_pretty(&output.rows).map_err(|err| std::io::Error::other(format!("Failed to serialize report: {err}")))?;
    println!("{json}");
    Ok(())
}

/**
 * Initializes structured logging.
 *
 * #Arguments
 * `logging`: Output format and destination. `RUST_LOG` and the configured directives select the levels.
 *
 * #Returns
 * A `Result` indicating success or failure.
 */
fn init_tracing(logging: &LoggingConfig) -> Result<(), std::io::Error> {
    let mut env_filter = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy();
    for directive in &logging.directives {
        env_filter = env_filter.add_directive(directive.parse().map_err(|err| std::io::Error::other(format!("Invalid logging directive {directive}: {err}")))?);
    }
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(logging.target)
        .with_thread_ids(logging.thread_ids)
        .with_thread_names(logging.thread_names)
        .with_line_number(logging.line_number)
        .with_level(logging.level);
    if logging.file {
        let logfile = File::options().create(true).append(true).open(&logging.logfile).map_err(|err| std::io::Error::other(format!("Failed to open log file {}: {err}", logging.logfile)))?;
        tracing_subscriber::registry().with(env_filter).with(fmt_layer.with_ansi(false).with_writer(Mutex::new(logfile))).init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt_layer.with_ansi(logging.ansi).with_writer(std::io::stderr)).init();
    }
    Ok(())
}

/**
 * Creates the data store holding the collections.
 *
 * #Arguments
 * `db_type`: The configured data store.
 *
 * #Returns
 * A `Result` containing the `DataStore` or an `std::io::Error` if the database pool cannot be created.
 */
async fn get_data_store(db_type: &DatabaseType) -> Result<DataStore, std::io::Error> {
    match db_type {
        DatabaseType::Postgresql { connection_string, max_connections, min_connections, acquire_timeout, acquire_slow_threshold, idle_timeout, max_lifetime } => {
            let connection_pool: Pool<Postgres> = pool::PoolOptions::new()
                .max_connections(*max_connections)
                .min_connections(*min_connections)
                .acquire_timeout(Duration::from_millis(*acquire_timeout))
                .acquire_slow_threshold(Duration::from_millis(*acquire_slow_threshold))
                .idle_timeout(Duration::from_millis(*idle_timeout))
                .max_lifetime(Duration::from_millis(*max_lifetime))
                .connect(connection_string.as_str())
                .await
                .map_err(|err| std::io::Error::other(format!("Failed to create database pool: {err}")))?;
            Ok(DataStore::Postgresql(connection_pool))
        }
        DatabaseType::JsonFile { path } => Ok(DataStore::JsonFile(PathBuf::from(path))),
    }
}

/**
 * Registers custom Prometheus metrics.
 *
 * #Arguments
 * `prometheus_metrics`: The Prometheus metrics instance to register the collector with.
 * `collector`: The gauge or counter to register.
 */
fn register_prometheus_metrics<C>(prometheus_metrics: &PrometheusMetrics, collector: &C) -> Result<(), std::io::Error>
where
    C: Collector + Clone + 'static,
{
    prometheus_metrics.registry.register(Box::new(collector.clone())).map_err(|err| std::io::Error::other(format!("Failed to register Prometheus metric: {err}")))?;
    Ok(())
}

/**
 * Gathers database pool metrics in a separate thread.
 *
 * #Arguments
 * `max_connections_gauge`: Gauge for maximum connections.
 * `active_connections_gauge`: Gauge for active connections.
 * `idle_connections_gauge`: Gauge for idle connections.
 * `connection_pool`: The connection pool to gather metrics from.
 */
fn gather_db_metrics(max_connections_gauge: IntGauge, active_connections_gauge: IntGauge, idle_connections_gauge: IntGauge, connection_pool: Pool<Postgres>) {
    thread::spawn(move || {
        loop {
            max_connections_gauge.set(i64::from(connection_pool.options().get_max_connections()));
            active_connections_gauge.set(i64::from(connection_pool.size()));
            #[allow(clippy::cast_possible_wrap)]
            idle_connections_gauge.set(connection_pool.num_idle() as i64);
            thread::sleep(Duration::from_secs(1));
        }
    });
}

/**
 * Initializes the SSL/TLS configuration for the server.
 *
 * #Arguments
 * `https_config`: The HTTPS configuration containing the certificate and private key files.
 *
 * #Returns
 * A `Result` containing the initialized `ServerConfig` or an `ApplicationError` if initialization fails.
 */
fn ssl_builder(https_config: &HttpsConfig) -> Result<ServerConfig, ApplicationError> {
    let config_builder = ServerConfig::builder_with_protocol_versions(&get_protocol_versions());
    let cert_file = &mut std::io::BufReader::new(
        File::open(&https_config.certificate_file).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read certificate file: {err}")))?,
    );
    let key_file = &mut std::io::BufReader::new(
        File::open(&https_config.private_key_file).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read private key file: {err}")))?,
    );
    let cert_chain = certs(cert_file).collect::<Result<Vec<_>, _>>().map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to convert certificate to der: {err}")))?;
    let private_key = pkcs8_private_keys(key_file)
        .next()
        .ok_or_else(|| ApplicationError::new(ErrorType::Initialization, "No PKCS#8 private key found".to_string()))?
        .map(PrivateKeyDer::Pkcs8)
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to convert private key to der: {err}")))?;
    config_builder
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create server config: {err}")))
}

/**
 * Returns the supported TLS protocol versions.
 */
fn get_protocol_versions() -> Vec<&'static SupportedProtocolVersion> {
    vec![&rustls::version::TLS13]
}

/**
 * Reads the configuration from the specified file.
 *
 * #Arguments
 * `config_file`: The path to the configuration file.
 *
 * #Returns
 * A `Result` containing the parsed `Config` or an `std::io::Error` if reading or parsing fails.
*/
fn get_config(config_file: &str) -> Result<Config, std::io::Error> {
    let config_str: String = std::fs::read_to_string(config_file).map_err(|err| std::io::Error::other(format!("Failed to read config file: {err}")))?;
    let config: Config = toml::from_str(&config_str).map_err(|err| std::io::Error::other(format!("Failed to parse config file: {err}")))?;
    Ok(config)
}
