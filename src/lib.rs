// Library exports for Inkpost
// The binary and the integration tests both build the app from here.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod images;
pub mod mail;
pub mod routes;
pub mod sanitize;
pub mod state;
