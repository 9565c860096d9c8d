//! sin-pdk: CLI for the SiN cell library and simulation sweep generator

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sin_pdk::{
    neff, run_sweep, Assignments, Backend, CellKind, Extrapolation, NeffModel, NeffTable,
    SimType, SweepMode, SweepRequest, SweepSpec,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sin-pdk")]
#[command(about = "SiN PDK cells, effective-index model and FDTD sweep generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate GDS files and solver scripts for a parameter sweep
    Sweep(SweepArgs),
    /// Evaluate the effective-index model at the given widths
    Neff(NeffArgs),
    /// List the available cells and their parameters
    Cells {
        /// Print the schemas as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the injection axis, direction and theta for port orientations
    Snap {
        /// Orientations in degrees
        #[arg(required = true, allow_negative_numbers = true)]
        angles: Vec<f64>,
    },
}

#[derive(Args, Debug)]
struct SweepArgs {
    /// Sweep request JSON; the flags below override its fields
    #[arg(short, long)]
    request: Option<PathBuf>,

    /// Cell to sweep (straight, bend_euler, coupler, taper_adiabatic, mmi1x2)
    #[arg(short, long)]
    cell: Option<String>,

    /// Parameter assignment NAME=VALUE; comma-separated values are swept
    #[arg(short, long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,

    /// Pair the i-th values of every swept parameter instead of taking all combinations
    #[arg(long)]
    paired: bool,

    /// Solver backend (lumerical, tidy3d)
    #[arg(long)]
    backend: Option<String>,

    /// Lumerical simulation type (FDTD, varFDTD)
    #[arg(long)]
    sim_type: Option<String>,

    /// Lumerical layer builder process file
    #[arg(long)]
    process_file: Option<PathBuf>,

    /// Run the Tidy3D modeler instead of only uploading it
    #[arg(long)]
    run: bool,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Margin on every side of the component in µm
    #[arg(long)]
    margin: Option<f64>,

    /// Distance from the monitors to the PML in µm
    #[arg(long)]
    distance_to_pml: Option<f64>,

    /// Centre wavelength in µm
    #[arg(long)]
    wavelength: Option<f64>,

    /// Wavelength span in µm
    #[arg(long)]
    bandwidth: Option<f64>,

    /// List the combinations without writing anything
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct NeffArgs {
    /// Widths in µm
    #[arg(required = true)]
    widths: Vec<f64>,

    /// CSV table with `width(um)` and `neff` columns (default: built-in SiN 300 nm table)
    #[arg(short, long)]
    table: Option<PathBuf>,

    /// Behaviour outside the table range (warn, clamp, error)
    #[arg(long, default_value = "warn")]
    policy: String,
}

fn parse_policy(s: &str) -> Result<Extrapolation> {
    match s.to_lowercase().as_str() {
        "warn" => Ok(Extrapolation::Warn),
        "clamp" => Ok(Extrapolation::Clamp),
        "error" => Ok(Extrapolation::Error),
        _ => anyhow::bail!("Unknown extrapolation policy: {}. Use: warn, clamp or error", s),
    }
}

fn build_request(args: &SweepArgs) -> Result<SweepRequest> {
    let assignments = Assignments::parse_pairs(args.params.as_slice()).context("Invalid --param")?;

    let mut request = match &args.request {
        Some(path) => SweepRequest::from_path(path)
            .with_context(|| format!("Failed to load sweep request: {:?}", path))?,
        None => {
            let cell = args
                .cell
                .as_deref()
                .context("Either --request or --cell is required")?;
            SweepRequest::new(cell.parse::<CellKind>()?, SweepSpec::new())
        }
    };

    if let Some(cell) = &args.cell {
        request.cell = cell.parse()?;
    }
    request.fixed.extend(assignments.fixed);
    if !assignments.swept.is_empty() {
        request.sweep = SweepSpec::from(assignments.swept);
    }
    if args.paired {
        request.mode = SweepMode::Paired;
    }
    if let Some(backend) = &args.backend {
        let backend: Backend = backend.parse()?;
        if backend.name() != request.backend.name() {
            request.backend = backend;
        }
    }
    match &mut request.backend {
        Backend::Lumerical(settings) => {
            if let Some(sim_type) = &args.sim_type {
                settings.sim_type = sim_type.parse::<SimType>()?;
            }
            if let Some(path) = &args.process_file {
                settings.process_file = Some(path.clone());
            }
        }
        Backend::Tidy3d(settings) => {
            settings.run |= args.run;
        }
    }
    if let Some(output) = &args.output {
        request.output_dir = output.clone();
    }

    let sim = &mut request.simulation;
    if let Some(m) = args.margin {
        sim.margin_top = m;
        sim.margin_bottom = m;
        sim.margin_left = m;
        sim.margin_right = m;
    }
    if let Some(d) = args.distance_to_pml {
        sim.distance_to_pml = d;
    }
    if let Some(wl) = args.wavelength {
        sim.wavelength = wl;
    }
    if let Some(bw) = args.bandwidth {
        sim.bandwidth = bw;
    }
    Ok(request)
}

fn sweep(args: &SweepArgs) -> Result<()> {
    let request = build_request(args)?;

    if args.dry_run {
        let combinations = request.plan().context("Invalid sweep")?;
        let folder = request.output_dir.join(request.folder_name());
        println!("{} -> {}", request.cell, folder.display());
        for combo in &combinations {
            println!("  {:<32} {}", combo.artifact_name(), combo.describe());
        }
        return Ok(());
    }

    let report = run_sweep(&request).context("Sweep failed")?;
    eprintln!(
        "Generated {} of {} combination(s) in {:?}",
        report.generated.len(),
        report.total,
        report.sweep_folder
    );
    for failure in &report.failures {
        eprintln!("  failed {}: {}", failure.artifact, failure.message);
    }
    if !report.is_complete() {
        anyhow::bail!("{} combination(s) failed", report.failures.len());
    }
    Ok(())
}

fn evaluate_neff(args: &NeffArgs) -> Result<()> {
    let policy = parse_policy(&args.policy)?;
    let model = match &args.table {
        Some(path) => {
            let table = NeffTable::from_csv_path(path)
                .with_context(|| format!("Failed to read neff table: {:?}", path))?;
            NeffModel::fit(&table)
        }
        None => neff::builtin_model()?.as_ref().clone(),
    }
    .with_policy(policy);

    let (min, max) = model.domain();
    println!("# fitted range {min} - {max} um");
    println!("width(um),neff");
    for &w in &args.widths {
        let n = model
            .eval(w)
            .with_context(|| format!("Cannot evaluate neff at {w} um"))?;
        println!("{w},{n:.6}");
    }
    Ok(())
}

fn list_cells(json: bool) -> Result<()> {
    let schemas: Vec<_> = CellKind::ALL.iter().map(CellKind::schema).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&schemas)?);
        return Ok(());
    }
    for schema in &schemas {
        println!("{}", schema.cell);
        for p in &schema.params {
            let kind = format!("{:?}", p.kind).to_lowercase();
            println!("  {:<14} {:<6} {:<10} {}", p.name, kind, p.default.to_string(), p.doc);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Sweep(args) => sweep(args)?,
        Command::Neff(args) => evaluate_neff(args)?,
        Command::Cells { json } => list_cells(*json)?,
        Command::Snap { angles } => {
            for &angle in angles {
                let inj = sin_pdk::snap_orientation(angle);
                println!(
                    "{angle}: snapped {} {} {} theta {}",
                    inj.snapped, inj.axis, inj.direction, inj.theta
                );
            }
        }
    }

    Ok(())
}
