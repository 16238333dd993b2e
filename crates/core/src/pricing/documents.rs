//! Pricing files named by an estimate request.
//!
//! `policy`, `unit_costs_csv` and `vendor_quotes_csv` are paths on the
//! service host. Blank values count as absent.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::domain::estimate::EstimateOptions;
use crate::pricing::policy::{PolicyDocument, PolicyFormat};
use crate::pricing::PricingError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PricingDocuments {
    pub policy: Option<PolicyDocument>,
    pub unit_costs_csv: Option<String>,
    pub vendor_quotes_csv: Option<String>,
}

impl PricingDocuments {
    /// Reads every file the options name. Blocking; callers on an async
    /// runtime should move this onto a blocking thread.
    pub fn load(options: &EstimateOptions) -> Result<Self, PricingError> {
        Ok(Self {
            policy: named_path(options.policy.as_deref())
                .map(|path| read_policy("policy", path))
                .transpose()?,
            unit_costs_csv: read_named("unit_costs_csv", options.unit_costs_csv.as_deref())?,
            vendor_quotes_csv: read_named(
                "vendor_quotes_csv",
                options.vendor_quotes_csv.as_deref(),
            )?,
        })
    }
}

/// `None` for a missing or whitespace-only value.
pub fn named_path(value: Option<&str>) -> Option<&Path> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(Path::new)
}

pub fn read_policy(field: &'static str, path: &Path) -> Result<PolicyDocument, PricingError> {
    let text = read_document(field, path)?;
    Ok(PolicyDocument::new(text, PolicyFormat::from_path(path)))
}

fn read_named(field: &'static str, value: Option<&str>) -> Result<Option<String>, PricingError> {
    named_path(value).map(|path| read_document(field, path)).transpose()
}

fn read_document(field: &'static str, path: &Path) -> Result<String, PricingError> {
    std::fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => PricingError::MissingFile { field, path: path.to_path_buf() },
        _ => PricingError::ReadFile { field, path: PathBuf::from(path), source },
    })
}
