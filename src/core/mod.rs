pub mod alerts;
pub mod config;
pub mod error;
pub mod model;
pub mod probe;
pub mod service;
