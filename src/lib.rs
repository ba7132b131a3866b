// Webflow proxy - Library root for testing

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod middleware;
pub mod ownership;
pub mod routes;
