// ===============================
// src/dataset.rs
// ===============================
//
// JSON dataset files for the `run` subcommand. List files may be either the
// bare array or wrapped as {"pools": [...]} / {"scenarios": [...]}.
//
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::domain::{HedgeCatalog, Pool, Scenario};
use crate::error::{OptimizerError, Result};

fn bad(what: &str, e: serde_json::Error) -> OptimizerError {
    OptimizerError::InvalidInput(format!("{what}: {e}"))
}

/// `{"<key>": T, ..}` when the root object has `key`, else the whole text as `T`.
/// Errors come from whichever shape was chosen, so they name the failing field.
fn parse_shape<T: DeserializeOwned>(text: &str, key: &str) -> Result<T> {
    let mut root: serde_json::Value = serde_json::from_str(text).map_err(|e| bad(key, e))?;
    let wrapped = match &mut root {
        serde_json::Value::Object(m) => m.remove(key),
        _ => None,
    };
    match wrapped {
        Some(inner) => serde_json::from_value(inner),
        None => serde_json::from_str(text),
    }
    .map_err(|e| bad(key, e))
}

pub fn parse_pools(text: &str) -> Result<Vec<Pool>> { parse_shape(text, "pools") }
pub fn parse_scenarios(text: &str) -> Result<Vec<Scenario>> { parse_shape(text, "scenarios") }
pub fn parse_hedges(text: &str) -> Result<HedgeCatalog> { parse_shape(text, "hedges") }

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| OptimizerError::InvalidInput(format!("read {}: {e}", path.display())))
}

pub async fn load_pools(path: &Path) -> Result<Vec<Pool>> { parse_pools(&read(path).await?) }
pub async fn load_scenarios(path: &Path) -> Result<Vec<Scenario>> { parse_scenarios(&read(path).await?) }
pub async fn load_hedges(path: &Path) -> Result<HedgeCatalog> { parse_hedges(&read(path).await?) }
