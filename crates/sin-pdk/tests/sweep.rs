use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use sin_pdk::{
    run_sweep, Backend, CellKind, ParamValue, PdkError, SweepMode, SweepRequest, SweepSpec,
    Tidy3dSettings,
};

fn request(json: &str, out: &Path) -> SweepRequest {
    let mut request = SweepRequest::from_json(json).unwrap();
    request.output_dir = out.to_path_buf();
    request
}

/// Relative path -> contents of every file under `dir`
fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        for entry in fs::read_dir(&d).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(dir).unwrap().display().to_string();
                files.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    files
}

#[test]
fn coupler_length_sweep_matches_reference_layout() {
    let dir = tempfile::tempdir().unwrap();
    let req = request(
        r#"{"cell": "coupler", "fixed": {"gap": 0.5}, "sweep": {"length": [20, 40]}}"#,
        dir.path(),
    );
    let report = run_sweep(&req).unwrap();
    assert_eq!(report.generated.len(), 2);

    // Two GDS files, two layout scripts, the manifest, the descriptor and the report
    assert_eq!(snapshot(dir.path()).len(), 7);

    let master = fs::read_to_string(dir.path().join("master_script.lsf")).unwrap();
    assert_eq!(
        master,
        "addpath(\"coupler_gap0p5_length\");\n\
         sweep_builder;\n\
         feval(\"length_1_generate_layout.lsf\");\n\
         feval(\"length_2_generate_layout.lsf\");\n"
    );

    let builder = fs::read_to_string(dir.path().join("sweep_builder.lsf")).unwrap();
    assert!(builder.starts_with("addsweep;\nsetsweep(\"sweep\", \"name\", \"length\");\n"));
    assert!(builder.contains("para.Value_1 = 20;\npara.Value_2 = 40;\n"));

    let layout = fs::read_to_string(
        dir.path()
            .join("coupler_gap0p5_length")
            .join("length_2_generate_layout.lsf"),
    )
    .unwrap();
    assert!(layout.contains("loadgdsfile(\"length_2.gds\");\n"));
    assert_eq!(layout.matches("addport;\n").count(), 4);
    assert!(layout.ends_with("save(\"length_2\");\n"));

    let report_json: serde_json::Value = serde_json::from_slice(
        &fs::read(dir.path().join("sweep_report.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report_json["total"], 2);
    assert_eq!(report_json["failures"].as_array().map(Vec::len), Some(0));
    assert!(report_json["generated_at"].as_str().is_some());
}

#[test]
fn product_sweep_names_every_combination() {
    let dir = tempfile::tempdir().unwrap();
    let req = request(
        r#"{"cell": "coupler", "sweep": {"length": [20, 40], "gap": [0.2, 0.3, 0.4]}}"#,
        dir.path(),
    );
    let report = run_sweep(&req).unwrap();
    assert_eq!(report.total, 6);
    let names: Vec<&str> = report.generated.iter().map(|j| j.artifact.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "length_1gap_1",
            "length_1gap_2",
            "length_1gap_3",
            "length_2gap_1",
            "length_2gap_2",
            "length_2gap_3",
        ]
    );
    assert!(report.sweep_folder.join("length_2gap_1.gds").is_file());
}

#[test]
fn rerun_overwrites_the_same_files() {
    let dir = tempfile::tempdir().unwrap();
    let req = request(
        r#"{"cell": "straight", "sweep": {"length": [5, 10]}}"#,
        dir.path(),
    );
    run_sweep(&req).unwrap();
    let first = snapshot(dir.path());
    run_sweep(&req).unwrap();
    let second = snapshot(dir.path());

    let keys: Vec<&String> = first.keys().collect();
    assert_eq!(keys, second.keys().collect::<Vec<_>>());
    for (name, bytes) in &first {
        // The report carries a timestamp; every generated artifact is byte-identical.
        if name != "sweep_report.json" {
            assert_eq!(bytes, &second[name], "{name} changed between runs");
        }
    }
}

#[test]
fn failing_combination_does_not_stop_the_sweep() {
    let dir = tempfile::tempdir().unwrap();
    // dy = 1 is narrower than gap + width, so that coupler cannot be built.
    let req = request(
        r#"{"cell": "coupler", "sweep": {"dy": [4.0, 1.0, 6.0]}}"#,
        dir.path(),
    );
    let report = run_sweep(&req).unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.generated.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].artifact, "dy_2");
    assert!(report.failures[0].message.contains("dy=1"));

    let folder = dir.path().join("coupler_dy");
    assert!(folder.join("dy_1.gds").is_file());
    assert!(!folder.join("dy_2.gds").exists());
    assert!(!folder.join("dy_2_generate_layout.lsf").exists());
    assert!(folder.join("dy_3.gds").is_file());

    let master = fs::read_to_string(dir.path().join("master_script.lsf")).unwrap();
    assert!(!master.contains("dy_2"));
    assert!(master.contains("feval(\"dy_3_generate_layout.lsf\");"));
}

#[test]
fn paired_length_mismatch_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let mut req = SweepRequest::new(
        CellKind::Coupler,
        SweepSpec::new()
            .with("length", [ParamValue::Float(20.0), ParamValue::Float(40.0)])
            .with("gap", [0.2, 0.3, 0.4].map(ParamValue::Float)),
    );
    req.mode = SweepMode::Paired;
    req.output_dir = out.clone();

    assert!(matches!(run_sweep(&req), Err(PdkError::Config(_))));
    assert!(!out.exists());
}

#[test]
fn unknown_swept_parameter_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let req = request(r#"{"cell": "straight", "sweep": {"radius": [1, 2]}}"#, &out);
    assert!(matches!(run_sweep(&req), Err(PdkError::UnknownParameter { .. })));
    assert!(!out.exists());
}

#[test]
fn tidy3d_backend_writes_python() {
    let dir = tempfile::tempdir().unwrap();
    let mut req = request(
        r#"{"cell": "taper_adiabatic", "sweep": {"width2": [3.0, 5.0]}, "mode": "paired"}"#,
        dir.path(),
    );
    req.backend = Backend::Tidy3d(Tidy3dSettings {
        run: true,
        ..Default::default()
    });
    let report = run_sweep(&req).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.sweep_builder, None);

    let folder = dir.path().join("taper_adiabatic_width2");
    let script = fs::read_to_string(folder.join("width2_2_simulation.py")).unwrap();
    assert!(script.contains("GDS_FILE = HERE / \"width2_2.gds\""));
    assert!(script.contains("smatrix = modeler.run()"));

    let run_all = fs::read_to_string(dir.path().join("run_all.py")).unwrap();
    assert!(run_all.contains("\"width2_1_simulation.py\","));
    assert!(run_all.contains("\"width2_2_simulation.py\","));
    assert!(!dir.path().join("sweep_builder.lsf").exists());
}
