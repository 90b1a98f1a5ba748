pub mod agent;
pub mod config;
pub mod errors;
pub mod functions;
pub mod models;
pub mod openapi;
pub mod providers;
pub mod schema;
pub mod token_bucket;
pub mod token_counter;
