// ===============================
// src/solver_api.rs
// ===============================
//
// Wire models for the external solver REST API (QCI Dirac-3).
// One schema, resolved at the boundary; no key-path guessing.
//
use serde::{Deserialize, Serialize};

use crate::poly::PolyBuilder;

pub const JOB_TYPE: &str = "sample-hamiltonian-integer";
pub const DEVICE_TYPE: &str = "dirac-3";

// ---- Auth ----
#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

// ---- Polynomial file ----
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolyTerm {
    /// Zero left-padded to max_degree, indices non-decreasing.
    pub idx: Vec<usize>,
    pub val: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polynomial {
    pub num_variables: usize,
    pub min_degree: usize,
    pub max_degree: usize,
    pub data: Vec<PolyTerm>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub polynomial: Polynomial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolynomialFile {
    pub file_name: String,
    pub file_config: FileConfig,
}

impl PolynomialFile {
    pub fn from_poly(file_name: impl Into<String>, poly: &PolyBuilder, num_variables: usize) -> Self {
        let max_degree = poly.max_degree();
        let data = poly
            .sorted_terms()
            .into_iter()
            .map(|(mono, val)| {
                let mut idx = vec![0usize; max_degree.saturating_sub(mono.len())];
                idx.extend(mono);
                PolyTerm { idx, val }
            })
            .collect();
        Self {
            file_name: file_name.into(),
            file_config: FileConfig {
                polynomial: Polynomial {
                    num_variables,
                    min_degree: poly.min_degree(),
                    max_degree,
                    data,
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FileResponse {
    pub file_id: String,
}

// ---- Job submission ----
#[derive(Debug, Clone, Serialize)]
pub struct JobParams {
    pub device_type: &'static str,
    pub num_samples: u32,
    pub relaxation_schedule: u8,
    /// [2] == binary variables for every index.
    pub num_levels: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSubmission {
    pub job_name: String,
    pub job_tags: Vec<String>,
    pub job_type: &'static str,
    pub polynomial_file_id: String,
    pub job_params: JobParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobBody {
    pub job_submission: JobSubmission,
}

impl JobBody {
    pub fn new(job_name: String, file_id: String, num_samples: u32, relaxation_schedule: u8) -> Self {
        Self {
            job_submission: JobSubmission {
                job_name,
                job_tags: vec!["hedge_allocator".into(), "hubo".into()],
                job_type: JOB_TYPE,
                polynomial_file_id: file_id,
                job_params: JobParams {
                    device_type: DEVICE_TYPE,
                    num_samples,
                    relaxation_schedule,
                    num_levels: vec![2],
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
}

// ---- Job status ----
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobResults {
    #[serde(default)]
    pub energies: Vec<f64>,
    #[serde(default)]
    pub solutions: Vec<Vec<f64>>,
    /// Multiplicity per sample; absent means 1 each.
    #[serde(default)]
    pub counts: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "queued")]
    Submitted,
    Running,
    Completed { results: JobResults },
    #[serde(alias = "errored", alias = "cancelled")]
    Failed {
        #[serde(default)]
        error: Option<String>,
    },
}
