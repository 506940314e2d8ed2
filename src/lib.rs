//! DataTico Costa Rica records API library
//!
//! Stores public and commercial Costa Rican records (personas fisicas,
//! personas juridicas, electoral roll extracts) as JSON documents grouped
//! into collections, and searches them with a single query across many
//! collections at once.
//!
//! # Modules
//!
//! - `api`: HTTP handlers and routing.
//! - `core`: Search, profile fusion, normalization, import jobs.
//! - `data`: Database connection and document storage.
//! - `integrations`: External service clients (Google Geocoding).
//! - `obs`: Observability and logging.
//! - `cache_validator`: Checksummed cache payloads.
//! - `circuit_breaker`: Circuit breaker around database queries.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `models`: Request, response, and storage models.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;
pub mod obs;

// Re-export primary modules for shared use in tests and other binaries
pub mod admin_handler;
pub mod cache_validator;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod imports;
pub mod models;
pub mod normalization;
pub mod profiles;
pub mod routes;
pub mod search;
pub mod services;
