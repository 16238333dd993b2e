//! Arguments shared by several commands and the local files they name.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use estimator_client::PlanInput;
use estimator_core::domain::estimate::EstimateOptions;
use estimator_core::interactive::plan::{LayoutMeta, PlanFeatures, PlanSource};
use estimator_core::{AnswerSubmission, QuantitiesInput};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Args)]
#[group(required = true, multiple = false)]
pub struct PlanArgs {
    #[arg(long, help = "Local plan PDF to send to the service")]
    pub file: Option<PathBuf>,
    #[arg(long, help = "Plan PDF path readable by the service itself")]
    pub server_path: Option<String>,
    #[arg(long, help = "JSON file with `plan_features` and optional `layout_meta`")]
    pub features: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct FeaturesFile {
    #[serde(default)]
    plan_features: PlanFeatures,
    #[serde(default)]
    layout_meta: Option<LayoutMeta>,
}

impl PlanArgs {
    /// The plan as a takeoff input. Feature maps cannot be taken off.
    pub fn plan_input(&self) -> Result<PlanInput> {
        if let Some(path) = &self.file {
            let bytes = read_bytes(path)?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "plan.pdf".to_string());
            return Ok(PlanInput::File { file_name, bytes });
        }
        if let Some(path) = &self.server_path {
            return Ok(PlanInput::ServerPath(path.clone()));
        }
        bail!("takeoff needs a PDF: pass --file or --server-path")
    }

    pub fn plan_source(&self) -> Result<PlanSource> {
        if let Some(path) = &self.features {
            let raw = read_text(path)?;
            let parsed: FeaturesFile = serde_json::from_str(&raw)
                .with_context(|| format!("`{}` is not a plan features document", path.display()))?;
            return Ok(PlanSource::Features {
                plan_features: parsed.plan_features,
                layout_meta: parsed.layout_meta,
            });
        }
        Ok(self.plan_input()?.plan_source())
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct PricingArgs {
    #[arg(long, help = "Pricing region")]
    pub region: Option<String>,
    #[arg(long, help = "Pricing policy file (TOML or YAML) readable by the service")]
    pub policy: Option<PathBuf>,
    #[arg(long, help = "Unit cost CSV (trade,code,unit_cost) readable by the service")]
    pub unit_costs: Option<PathBuf>,
    #[arg(long, help = "Vendor quote CSV (trade,code,unit_cost) readable by the service")]
    pub vendor_quotes: Option<PathBuf>,
    #[arg(long, help = "Apply the overlays stored by the project's last QnA round")]
    pub interactive: bool,
}

impl PricingArgs {
    /// Pricing files travel as paths the service opens itself. Relative
    /// paths are made absolute against the working directory.
    pub fn estimate_options(&self) -> Result<EstimateOptions> {
        Ok(EstimateOptions {
            region: self.region.clone(),
            policy: self.policy.as_deref().map(service_path).transpose()?,
            unit_costs_csv: self.unit_costs.as_deref().map(service_path).transpose()?,
            vendor_quotes_csv: self.vendor_quotes.as_deref().map(service_path).transpose()?,
            mode: self.interactive.then(|| "interactive".to_string()),
        })
    }
}

fn service_path(path: &Path) -> Result<String> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("cannot resolve `{}`", path.display()))?;
    Ok(absolute.to_string_lossy().into_owned())
}

/// Parses `ID=KEY` into a keyed answer.
pub fn parse_answer(raw: &str) -> std::result::Result<AnswerSubmission, String> {
    match raw.split_once('=') {
        Some((id, key)) if !id.trim().is_empty() && !key.trim().is_empty() => {
            Ok(AnswerSubmission::keyed(id.trim(), key.trim()))
        }
        _ => Err(format!("expected QUESTION_ID=ANSWER, got `{raw}`")),
    }
}

/// A quantities file: a takeoff result, its `trades`, or a quantity table.
pub fn read_quantities(path: &Path) -> Result<QuantitiesInput> {
    let raw = read_text(path)?;
    serde_json::from_str(&raw)
        .with_context(|| format!("`{}` is not a takeoff result or quantity table", path.display()))
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read `{}`", path.display()))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read `{}`", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use estimator_core::interactive::plan::PlanSource;
    use estimator_core::QuantitiesInput;

    use super::{parse_answer, read_quantities, PlanArgs, PricingArgs};

    #[test]
    fn answers_parse_from_id_equals_key() {
        let answer = parse_answer("p1_roofing_material_0=metal").expect("answer");
        assert_eq!(answer.id, "p1_roofing_material_0");
        assert_eq!(answer.value(), Some("metal"));

        assert!(parse_answer("p1_roofing_material_0").is_err());
        assert!(parse_answer("=metal").is_err());
    }

    #[test]
    fn features_file_becomes_a_feature_plan_source() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"plan_features": {{"full_text": "roof shingle"}}}}"#).expect("write");
        let args = PlanArgs { features: Some(file.path().to_path_buf()), ..PlanArgs::default() };

        match args.plan_source().expect("plan source") {
            PlanSource::Features { plan_features, layout_meta } => {
                assert_eq!(plan_features.full_text, "roof shingle");
                assert!(layout_meta.is_none());
            }
            other => panic!("expected features, got {other:?}"),
        }
        assert!(args.plan_input().is_err());
    }

    #[test]
    fn quantity_tables_are_read() {
        let mut quantities = tempfile::NamedTempFile::new().expect("temp file");
        write!(quantities, r#"[{{"trade": "concrete", "code": "slab", "qty": 10}}]"#)
            .expect("write");

        let parsed = read_quantities(quantities.path()).expect("quantities");
        assert!(matches!(parsed, QuantitiesInput::Table(ref lines) if lines.len() == 1));
    }

    #[test]
    fn pricing_files_are_sent_as_absolute_paths_not_contents() {
        let options = PricingArgs {
            policy: Some("schemas/pricing_policy.v0.yaml".into()),
            unit_costs: Some("/srv/pricing/unit_costs.csv".into()),
            interactive: true,
            ..PricingArgs::default()
        }
        .estimate_options()
        .expect("options");

        let policy = options.policy.clone().expect("policy path");
        assert!(Path::new(&policy).is_absolute());
        assert!(policy.ends_with("pricing_policy.v0.yaml"));
        assert_eq!(options.unit_costs_csv.as_deref(), Some("/srv/pricing/unit_costs.csv"));
        assert!(options.vendor_quotes_csv.is_none());
        assert!(options.is_interactive());
    }
}
