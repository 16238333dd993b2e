use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use base64::{prelude::BASE64_STANDARD, Engine};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::errors::WorkflowError;
use crate::interactive::pdf::{looks_like_pdf, scan_document, ContentScan};

static AREA_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(?:sq\.?\s*ft|sqft|sf|square\s+feet)\b")
        .expect("invalid area regex")
});

static SCALE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?i)\bscale\s*:?\s*"#,
        r#"(?:(\d+)\s*/\s*(\d+)\s*"?\s*=\s*\d+\s*'(?:\s*-\s*\d+\s*")?|(\d+)\s*:\s*(\d+))"#,
    ))
    .expect("invalid scale regex")
});

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("pdf_base64 is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("plan payload is empty")]
    Empty,
    #[error("plan payload is not a PDF document")]
    NotPdf,
    #[error("could not read plan `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
}

impl From<PlanError> for WorkflowError {
    fn from(error: PlanError) -> Self {
        WorkflowError::validation(error.to_string())
    }
}

/// Features read off a plan set, or supplied directly by a caller that has
/// its own extractor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanFeatures {
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub sheet_titles: Vec<String>,
    #[serde(default, alias = "sheet_count")]
    pub page_count: u32,
    #[serde(default)]
    pub estimated_area_sf: f64,
    #[serde(default)]
    pub scales: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl PlanFeatures {
    /// Text used for keyword matching: body text plus sheet titles, lowercased.
    pub fn searchable_text(&self) -> String {
        let mut text = self.full_text.to_lowercase();
        for title in &self.sheet_titles {
            text.push(' ');
            text.push_str(&title.to_lowercase());
        }
        text
    }
}

/// Layout analysis hints. Every field is optional on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutMeta {
    pub foundation_type: Option<String>,
    pub slab_markers: Vec<String>,
    pub window_count: u32,
    pub window_frame_markers: Vec<String>,
    pub room_count: u32,
    pub room_types: Vec<String>,
    pub fixture_count: u32,
    pub plumbing_fixtures: Vec<String>,
    pub bathroom_count: u32,
}

/// Body of `POST /v1/interactive/assess`. Exactly one plan representation
/// must be present; `layout_meta` travels with `plan_features`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessRequest {
    #[serde(default)]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_features: Option<PlanFeatures>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_meta: Option<LayoutMeta>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlanSource {
    PdfBase64(String),
    PdfPath(PathBuf),
    Features { plan_features: PlanFeatures, layout_meta: Option<LayoutMeta> },
}

impl PlanSource {
    pub fn pdf_bytes(bytes: &[u8]) -> Self {
        Self::PdfBase64(BASE64_STANDARD.encode(bytes))
    }

    pub fn into_request(self, project_id: impl Into<String>) -> AssessRequest {
        let mut request =
            AssessRequest { project_id: project_id.into(), ..AssessRequest::default() };
        match self {
            Self::PdfBase64(encoded) => request.pdf_base64 = Some(encoded),
            Self::PdfPath(path) => request.pdf_path = Some(path.to_string_lossy().into_owned()),
            Self::Features { plan_features, layout_meta } => {
                request.plan_features = Some(plan_features);
                request.layout_meta = layout_meta;
            }
        }
        request
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|value| !value.trim().is_empty())
}

impl AssessRequest {
    pub fn plan_source(&self) -> Result<PlanSource, WorkflowError> {
        let has_features = self.plan_features.is_some() || self.layout_meta.is_some();
        let supplied = [present(&self.pdf_base64), present(&self.pdf_path), has_features]
            .into_iter()
            .filter(|supplied| *supplied)
            .count();

        match supplied {
            0 => Err(WorkflowError::validation(
                "a plan is required: provide pdf_base64, pdf_path or plan_features",
            )),
            1 => {
                let encoded = self.pdf_base64.as_deref().filter(|_| present(&self.pdf_base64));
                if let Some(encoded) = encoded {
                    return Ok(PlanSource::PdfBase64(encoded.trim().to_string()));
                }
                if let Some(path) = self.pdf_path.as_deref().filter(|_| present(&self.pdf_path)) {
                    return Ok(PlanSource::PdfPath(PathBuf::from(path.trim())));
                }
                Ok(PlanSource::Features {
                    plan_features: self.plan_features.clone().unwrap_or_default(),
                    layout_meta: self.layout_meta.clone(),
                })
            }
            _ => Err(WorkflowError::validation(
                "provide exactly one plan representation: pdf_base64, pdf_path or plan_features",
            )),
        }
    }
}

/// A plan after reading: features for inference plus drawing statistics and
/// a digest identifying the input.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanDocument {
    pub features: PlanFeatures,
    pub layout: Option<LayoutMeta>,
    pub line_ops: u64,
    pub rect_ops: u64,
    pub digest: String,
}

impl PlanDocument {
    pub fn load(source: PlanSource) -> Result<Self, PlanError> {
        match source {
            PlanSource::PdfBase64(encoded) => {
                let bytes = decode_pdf_base64(&encoded)?;
                Self::from_pdf_bytes(&bytes, None)
            }
            PlanSource::PdfPath(path) => Self::from_pdf_path(&path),
            PlanSource::Features { plan_features, layout_meta } => {
                Ok(Self::from_features(plan_features, layout_meta))
            }
        }
    }

    pub fn from_pdf_path(path: &Path) -> Result<Self, PlanError> {
        let bytes = std::fs::read(path)
            .map_err(|source| PlanError::ReadFile { path: path.to_path_buf(), source })?;
        let file_name = path.file_name().map(|name| name.to_string_lossy().into_owned());
        Self::from_pdf_bytes(&bytes, file_name)
    }

    pub fn from_pdf_bytes(bytes: &[u8], file_name: Option<String>) -> Result<Self, PlanError> {
        if bytes.is_empty() {
            return Err(PlanError::Empty);
        }
        if !looks_like_pdf(bytes) {
            return Err(PlanError::NotPdf);
        }

        let scan = scan_document(bytes);
        Ok(Self {
            features: features_from_scan(&scan, file_name),
            layout: None,
            line_ops: scan.line_ops,
            rect_ops: scan.rect_ops,
            digest: sha256_hex(bytes),
        })
    }

    pub fn from_features(features: PlanFeatures, layout: Option<LayoutMeta>) -> Self {
        let canonical = serde_json::json!({ "plan_features": &features, "layout_meta": &layout });
        let digest = sha256_hex(canonical.to_string().as_bytes());
        Self { features, layout, line_ops: 0, rect_ops: 0, digest }
    }

    pub fn scale_units(&self) -> Option<&str> {
        self.features.scales.first().map(String::as_str)
    }
}

pub fn decode_pdf_base64(encoded: &str) -> Result<Vec<u8>, PlanError> {
    let trimmed = encoded.trim();
    let payload = match trimmed.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => trimmed,
    };
    let compact: String = payload.chars().filter(|ch| !ch.is_ascii_whitespace()).collect();
    BASE64_STANDARD.decode(compact).map_err(|error| PlanError::InvalidBase64(error.to_string()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn features_from_scan(scan: &ContentScan, file_name: Option<String>) -> PlanFeatures {
    let full_text = scan.full_text();
    PlanFeatures {
        estimated_area_sf: estimate_area_sf(&full_text),
        scales: find_scales(&full_text),
        sheet_titles: Vec::new(),
        page_count: scan.page_count.max(1),
        full_text,
        file_name,
    }
}

/// Largest `N sf` style figure in the text; room schedules list smaller
/// areas next to the gross total.
pub fn estimate_area_sf(text: &str) -> f64 {
    AREA_REGEX
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .filter_map(|value| value.as_str().replace(',', "").parse::<f64>().ok())
        .fold(0.0, f64::max)
}

/// Scale callouts normalized to `1_8in_per_ft` or `1_to_100`.
pub fn find_scales(text: &str) -> Vec<String> {
    let mut scales = Vec::new();
    for captures in SCALE_REGEX.captures_iter(text) {
        let groups = (captures.get(1), captures.get(2), captures.get(3), captures.get(4));
        let normalized = match groups {
            (Some(num), Some(den), _, _) => format!("{}_{}in_per_ft", num.as_str(), den.as_str()),
            (_, _, Some(left), Some(right)) => format!("{}_to_{}", left.as_str(), right.as_str()),
            _ => continue,
        };
        if !scales.contains(&normalized) {
            scales.push(normalized);
        }
    }
    scales
}
