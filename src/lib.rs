// ===============================
// src/lib.rs
// ===============================
pub mod config;
pub mod cost_model;
pub mod dataset;
pub mod decoder;
pub mod domain;
pub mod encoder;
pub mod error;
pub mod exhaustive;
pub mod hubo;
pub mod metrics;
pub mod optimizer;
pub mod orchestrator;
pub mod poly;
pub mod recorder;
pub mod server;
pub mod solver_api;
pub mod solver_client;
pub mod validate;

#[cfg(test)]
mod testutil;
