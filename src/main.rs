use std::path::PathBuf;

use clap::Parser;
use embedfem::{
    backend::ModelPart,
    engine::FileEngine,
    error::EmbedfemError,
    orchestrator::Orchestrator,
    post_processor,
    settings::{load_settings, BackgroundGrid},
};

#[derive(Parser, Debug)]
#[command(name = "embedfem")]
#[command(about = "Assembles an embedded finite element model from cut-cell integration data", long_about = None)]
struct Args {
    /// Path to the JSON settings file
    settings: String,

    /// Path to the JSON element classification exported by the geometry engine
    elements: PathBuf,

    /// Directory the CSV output is written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
}

fn run(args: &Args) -> Result<(), EmbedfemError> {
    let settings = load_settings(&args.settings)?;

    let mut orchestrator = Orchestrator::new(
        settings,
        ModelPart::new("NurbsMesh"),
        Box::new(FileEngine::new(&args.elements)),
        Box::new(|grid: &BackgroundGrid, model_part: &mut ModelPart| {
            Ok(model_part.create_background_volume("NurbsVolume", grid))
        }),
    );

    orchestrator.setup_geometry()?;
    let summary = orchestrator.modify_initial_geometry()?;
    log::info!(
        "assembled {} elements (volume {:.6}) and {} conditions",
        summary.elements,
        summary.volume,
        summary.conditions
    );

    post_processor::csv_output(orchestrator.backend(), &args.output_dir)
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    if let Err(err) = run(&args) {
        log::error!("{err}");
        eprintln!("{err}");
        std::process::exit(1)
    }
}
