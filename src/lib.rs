#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;

pub use config::Config;

use rocket::{Build, Rocket};

/// Assemble the application: logging, config, database, notification sink,
/// and the API routes.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(logging::LoggerFairing)
        .attach(config::ConfigFairing)
        .attach(config::DatabaseFairing)
        .attach(notify::NotifierFairing)
        .mount("/", api::routes())
}

/// Connect to the test database server.
/// Used by the `#[backend_test]` harness.
#[cfg(test)]
pub(crate) async fn test_db_client() -> mongodb::Client {
    let uri = std::env::var("TEST_DB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    mongodb::Client::with_uri_str(&uri)
        .await
        .expect("Failed to connect to the test database")
}

/// A random database name, so concurrent tests cannot collide.
#[cfg(test)]
pub(crate) fn test_database_name() -> String {
    let random: u32 = rand::random();
    format!("test{random}")
}

/// A rocket wired to the given throwaway database, with the notification
/// sink disabled and test-only config values merged in.
#[cfg(test)]
pub(crate) async fn test_rocket(db_client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let db = db_client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db)
        .await
        .expect("Failed to create test indexes");

    let figment = rocket::Config::figment()
        .merge(("jwt_secret", "unit-test-jwt-secret"))
        .merge(("auth_ttl", 3600))
        .merge(("log_level", "off"));

    rocket::custom(figment)
        .attach(config::ConfigFairing)
        .manage(db_client)
        .manage(db)
        .manage(notify::Notifier::disabled())
        .mount("/", api::routes())
}
