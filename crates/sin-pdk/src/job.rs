//! Sweep expansion: one GDS and one solver script per parameter combination

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, LumericalSettings, SimulationConfig};
use crate::cells::{component_name, CellKind};
use crate::codegen::{JobScript, ScriptRenderer};
use crate::error::{PdkError, Result};
use crate::gds;
use crate::params::ParamSet;
use crate::sweep::{Combination, SweepMode, SweepSpec};
use crate::tech::LayerStack;

/// Name of the JSON summary written next to the manifest
pub const REPORT_FILE: &str = "sweep_report.json";
/// Lumerical sweep-object descriptor
pub const SWEEP_BUILDER_FILE: &str = "sweep_builder.lsf";

fn default_output_dir() -> PathBuf {
    PathBuf::from("simulation_inputs")
}

/// A complete sweep job, as read from a request file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRequest {
    pub cell: CellKind,
    /// Parameters held constant across the sweep
    #[serde(default)]
    pub fixed: ParamSet,
    pub sweep: SweepSpec,
    #[serde(default)]
    pub mode: SweepMode,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl SweepRequest {
    pub fn new(cell: CellKind, sweep: SweepSpec) -> Self {
        Self {
            cell,
            fixed: ParamSet::new(),
            sweep,
            mode: SweepMode::default(),
            simulation: SimulationConfig::default(),
            backend: Backend::default(),
            output_dir: default_output_dir(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PdkError::io(path, e))?;
        Self::from_json(&text)
    }

    /// Folder for per-combination files: the cell name with its fixed
    /// parameters, then the first swept parameter.
    pub fn folder_name(&self) -> String {
        let base = component_name(self.cell, [&self.effective_fixed()]);
        match self.sweep.first_name() {
            Some(first) => format!("{base}_{first}"),
            None => base,
        }
    }

    /// Check the whole request and enumerate its combinations.
    ///
    /// Every swept value is resolved against the cell schema, so unknown
    /// names and mistyped or out-of-range values fail here, before anything
    /// is written.
    pub fn plan(&self) -> Result<Vec<Combination>> {
        self.simulation.validate()?;
        let combinations = self.sweep.combinations(self.mode)?;

        let schema = self.cell.schema();
        let fixed = self.effective_fixed();
        schema.resolve([&fixed])?;
        for (name, values) in self.sweep.iter() {
            if self.fixed.contains_key(name) {
                tracing::warn!("`{}` is both fixed and swept, the swept values win", name);
            }
            for value in values {
                let single: ParamSet = [(name.to_string(), value.clone())].into_iter().collect();
                schema.resolve([&fixed, &single])?;
            }
        }
        Ok(combinations)
    }

    /// Fixed parameters that no swept parameter overrides
    pub fn effective_fixed(&self) -> ParamSet {
        self.fixed
            .iter()
            .filter(|(name, _)| self.sweep.values(name.as_str()).is_none())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// Files written for one successful combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobArtifacts {
    pub artifact: String,
    pub component: String,
    pub params: ParamSet,
    pub gds: PathBuf,
    pub script: PathBuf,
}

/// A combination whose component or scripts could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinationFailure {
    pub artifact: String,
    pub params: ParamSet,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub cell: CellKind,
    pub backend: String,
    pub mode: SweepMode,
    pub sweep_folder: PathBuf,
    pub total: usize,
    pub generated: Vec<JobArtifacts>,
    pub failures: Vec<CombinationFailure>,
    pub manifest: PathBuf,
    pub sweep_builder: Option<PathBuf>,
    pub generated_at: String,
}

impl SweepReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// In-memory result of one combination, written only once fully rendered
struct Rendered {
    component: String,
    gds: Vec<u8>,
    script: String,
}

/// Expand a sweep request into GDS files and solver scripts under its output directory.
pub fn run_sweep(request: &SweepRequest) -> Result<SweepReport> {
    let combinations = request.plan()?;
    let renderer = ScriptRenderer::new()?;
    let stack = LayerStack::default();

    let root = &request.output_dir;
    let folder_name = request.folder_name();
    let folder = root.join(&folder_name);

    if let Backend::Lumerical(settings) = &request.backend {
        check_process_file(settings)?;
    }
    fs::create_dir_all(&folder).map_err(|e| PdkError::io(&folder, e))?;

    tracing::info!(
        "expanding {} {} combination(s) of {} into {}",
        combinations.len(),
        request.backend.name(),
        request.cell,
        folder.display()
    );

    if let Backend::Lumerical(settings) = &request.backend {
        stage_process_file(settings, root)?;
    }

    let suffix = request.backend.script_suffix();
    let mut generated = Vec::new();
    let mut failures = Vec::new();

    for combo in &combinations {
        let artifact = combo.artifact_name();
        let params = combo.params();

        let rendered = match render_job(request, &renderer, &stack, &artifact, &params) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::error!("{} ({}) failed: {}", artifact, combo.describe(), e);
                failures.push(CombinationFailure {
                    artifact,
                    params,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let gds_path = folder.join(format!("{artifact}.gds"));
        let script_path = folder.join(format!("{artifact}{suffix}"));
        write_file(&gds_path, &rendered.gds)?;
        write_file(&script_path, rendered.script.as_bytes())?;
        tracing::info!("generated {} ({})", artifact, combo.describe());

        generated.push(JobArtifacts {
            artifact,
            component: rendered.component,
            params,
            gds: gds_path,
            script: script_path,
        });
    }

    let scripts: Vec<String> = generated
        .iter()
        .map(|job| format!("{}{suffix}", job.artifact))
        .collect();

    let manifest = root.join(request.backend.manifest_name());
    let manifest_text = match &request.backend {
        Backend::Lumerical(_) => renderer.master_lsf(&folder_name, &scripts)?,
        Backend::Tidy3d(_) => renderer.run_all_py(&folder_name, &scripts)?,
    };
    write_file(&manifest, manifest_text.as_bytes())?;

    let sweep_builder = if request.backend.supports_native_sweep() {
        let path = root.join(SWEEP_BUILDER_FILE);
        let descriptor = renderer.sweep_builder_lsf(&request.sweep, request.mode)?;
        write_file(&path, descriptor.as_bytes())?;
        Some(path)
    } else {
        None
    };

    let report = SweepReport {
        cell: request.cell,
        backend: request.backend.name().to_string(),
        mode: request.mode,
        sweep_folder: folder,
        total: combinations.len(),
        generated,
        failures,
        manifest,
        sweep_builder,
        generated_at: chrono::Utc::now().to_rfc3339(),
    };
    write_file(
        &root.join(REPORT_FILE),
        serde_json::to_string_pretty(&report)?.as_bytes(),
    )?;

    if report.is_complete() {
        tracing::info!("sweep complete: {} artifact set(s)", report.generated.len());
    } else {
        tracing::warn!(
            "sweep finished with {} failure(s) out of {} combination(s)",
            report.failures.len(),
            report.total
        );
    }
    Ok(report)
}

/// Build, pad and extend the component, then render both files in memory.
fn render_job(
    request: &SweepRequest,
    renderer: &ScriptRenderer,
    stack: &LayerStack,
    artifact: &str,
    params: &ParamSet,
) -> Result<Rendered> {
    let sim = &request.simulation;
    let component = request.cell.build([&request.effective_fixed(), params])?;
    let extended = component
        .with_padding(
            sim.margin_top,
            sim.margin_bottom,
            sim.margin_left,
            sim.margin_right,
        )?
        .with_extended_ports(sim.port_extension());

    let gds = gds::to_gds_bytes(&extended)?;
    let job = JobScript {
        artifact,
        params,
        component: &component,
        extended: &extended,
        sim,
    };
    let script = match &request.backend {
        Backend::Lumerical(settings) => renderer.layout_lsf(&job, settings)?,
        Backend::Tidy3d(settings) => renderer.tidy3d_py(&job, settings, stack)?,
    };
    Ok(Rendered {
        component: component.name,
        gds,
        script,
    })
}

/// A configured process file must exist before anything is written.
fn check_process_file(settings: &LumericalSettings) -> Result<()> {
    if let Some(source) = &settings.process_file {
        if !source.is_file() {
            return Err(PdkError::io(
                source,
                std::io::Error::new(std::io::ErrorKind::NotFound, "process file not found"),
            ));
        }
    }
    Ok(())
}

/// Copy the layer builder process file next to the manifest.
fn stage_process_file(settings: &LumericalSettings, root: &Path) -> Result<()> {
    match &settings.process_file {
        Some(source) => {
            let target = root.join(settings.process_file_name());
            if source.as_path() != target.as_path() {
                fs::copy(source, &target).map_err(|e| PdkError::io(source, e))?;
            }
        }
        None => tracing::warn!(
            "no layer builder process file given; scripts will load `{}` from the working directory",
            settings.process_file_name()
        ),
    }
    Ok(())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).map_err(|e| PdkError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;
    use pretty_assertions::assert_eq;

    fn coupler_request(dir: &Path) -> SweepRequest {
        let mut request = SweepRequest::new(
            CellKind::Coupler,
            SweepSpec::new().with("length", vec![ParamValue::Int(20), ParamValue::Int(40)]),
        );
        request.fixed.insert("gap".into(), ParamValue::Float(0.5));
        request.output_dir = dir.to_path_buf();
        request
    }

    #[test]
    fn test_request_from_json_defaults() {
        let request = SweepRequest::from_json(
            r#"{"cell": "coupler", "fixed": {"gap": 0.5}, "sweep": {"length": [20, 40]}}"#,
        )
        .unwrap();
        assert_eq!(request.mode, SweepMode::AllCombinations);
        assert_eq!(request.simulation, SimulationConfig::default());
        assert_eq!(request.backend, Backend::default());
        assert_eq!(request.output_dir, PathBuf::from("simulation_inputs"));
        assert_eq!(request.folder_name(), "coupler_gap0p5_length");
    }

    #[test]
    fn test_plan_rejects_unknown_names() {
        let mut request = coupler_request(Path::new("unused"));
        request.fixed.insert("radius".into(), ParamValue::Float(5.0));
        assert!(matches!(request.plan(), Err(PdkError::UnknownParameter { .. })));

        let mut request = coupler_request(Path::new("unused"));
        request.sweep = SweepSpec::new().with("lenght", vec![ParamValue::Int(20)]);
        assert!(matches!(request.plan(), Err(PdkError::UnknownParameter { .. })));
    }

    #[test]
    fn test_plan_rejects_bad_values() {
        let mut request = coupler_request(Path::new("unused"));
        request.sweep = SweepSpec::new().with("length", vec![ParamValue::Str("long".into())]);
        assert!(matches!(request.plan(), Err(PdkError::ParameterType { .. })));
    }

    #[test]
    fn test_lumerical_sweep_writes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_sweep(&coupler_request(dir.path())).unwrap();

        assert_eq!(report.total, 2);
        assert!(report.is_complete());
        let folder = dir.path().join("coupler_gap0p5_length");
        assert_eq!(report.sweep_folder, folder);
        for name in ["length_1", "length_2"] {
            assert!(folder.join(format!("{name}.gds")).is_file());
            assert!(folder.join(format!("{name}_generate_layout.lsf")).is_file());
        }
        assert_eq!(report.generated[1].component, "coupler_gap0p5_length40");
        assert!(dir.path().join("master_script.lsf").is_file());
        assert!(dir.path().join(SWEEP_BUILDER_FILE).is_file());
        assert!(dir.path().join(REPORT_FILE).is_file());
    }

    #[test]
    fn test_process_file_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let lbr = dir.path().join("custom.lbr");
        fs::write(&lbr, "<process/>").unwrap();
        let out = dir.path().join("out");

        let mut request = coupler_request(&out);
        request.backend = Backend::Lumerical(LumericalSettings {
            process_file: Some(lbr),
            ..Default::default()
        });
        let report = run_sweep(&request).unwrap();
        assert!(out.join("custom.lbr").is_file());
        let script = fs::read_to_string(&report.generated[0].script).unwrap();
        assert!(script.contains("loadprocessfile(\"custom.lbr\");"));
    }

    #[test]
    fn test_missing_process_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = coupler_request(dir.path());
        request.backend = Backend::Lumerical(LumericalSettings {
            process_file: Some(dir.path().join("missing.lbr")),
            ..Default::default()
        });
        let folder = dir.path().join(request.folder_name());
        assert!(matches!(run_sweep(&request), Err(PdkError::Io { .. })));
        assert!(!folder.exists());
        assert!(!dir.path().join("master_script.lsf").exists());
    }

    #[test]
    fn test_swept_value_overrides_invalid_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = coupler_request(dir.path());
        // Out of range on its own, but every combination replaces it.
        request.fixed.insert("length".into(), ParamValue::Float(-5.0));

        assert_eq!(request.effective_fixed().len(), 1);
        assert_eq!(request.folder_name(), "coupler_gap0p5_length");
        assert_eq!(request.plan().unwrap().len(), 2);

        let report = run_sweep(&request).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.generated.len(), 2);
    }

    #[test]
    fn test_invalid_fixed_value_still_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = coupler_request(dir.path());
        request.fixed.insert("gap".into(), ParamValue::Float(-1.0));
        assert!(matches!(request.plan(), Err(PdkError::ParameterRange { .. })));
    }
}
