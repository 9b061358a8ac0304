//! sgbot - command line front end for state graph automations
//!
//! Inspect, lay out and bundle graph documents. With the `desktop` feature
//! it can also run a graph against a live window.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use state_graph_bot::graph::document::export_bundle;
use state_graph_bot::graph::Layout;
use state_graph_bot::{Graph, GraphError};

/// Graph-driven visual automation
#[derive(Parser, Debug)]
#[command(name = "sgbot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding template images
    #[arg(short, long, env = "SGBOT_ASSETS", default_value = "assets")]
    assets: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report structural problems and missing images
    Validate {
        /// Graph document
        graph: PathBuf,
    },

    /// Print vertices and edges
    Describe {
        /// Graph document
        graph: PathBuf,
        /// Print the engine-facing JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Write the layout sidecar, filling in positions for new vertices
    Layout {
        /// Graph document
        graph: PathBuf,
        /// Discard the existing sidecar and lay out from scratch
        #[arg(short, long)]
        force: bool,
    },

    /// Copy a graph, its layout and its images into a directory
    Export {
        /// Graph document
        graph: PathBuf,
        /// Output directory
        out: PathBuf,
    },

    /// Run a graph against a window
    #[cfg(feature = "desktop")]
    Run {
        /// Graph document
        graph: PathBuf,
        /// Part of the target window's title
        #[arg(short, long)]
        window: String,
        /// Engine settings file (JSON)
        #[arg(short, long, env = "SGBOT_SETTINGS")]
        settings: Option<PathBuf>,
        /// Never bring the window to the foreground
        #[arg(long)]
        background: bool,
        /// Log input instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[cfg(feature = "desktop")]
    #[error(transparent)]
    Engine(#[from] state_graph_bot::EngineError),
    #[cfg(feature = "desktop")]
    #[error(transparent)]
    Config(#[from] state_graph_bot::config::ConfigError),
    #[cfg(feature = "desktop")]
    #[error(transparent)]
    Vision(#[from] state_graph_bot::vision::VisionError),
    #[cfg(feature = "desktop")]
    #[error(transparent)]
    Input(#[from] state_graph_bot::input::InputError),
    #[error("{0} problem(s) found")]
    Invalid(usize),
}

fn main() -> ExitCode {
    // RUST_LOG=debug for per-edge detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let cli = Cli::parse();
    match dispatch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Commands::Validate { graph } => validate(graph, &cli.assets),
        Commands::Describe { graph, json } => describe(graph, *json),
        Commands::Layout { graph, force } => layout(graph, *force),
        Commands::Export { graph, out } => {
            let loaded = Graph::load_from_file(graph)?;
            let positions = Layout::load_or_auto(graph, &loaded);
            let copied = export_bundle(&loaded, &positions, &cli.assets, out)?;
            println!("Exported {} asset(s) to {}", copied.len(), out.display());
            Ok(())
        }
        #[cfg(feature = "desktop")]
        Commands::Run {
            graph,
            window,
            settings,
            background,
            dry_run,
        } => run(cli, graph, window, settings.as_deref(), *background, *dry_run),
    }
}

fn validate(path: &Path, assets: &Path) -> Result<(), CliError> {
    let graph = Graph::load_from_file(path)?;
    let mut problems = graph.validate();
    for name in graph.referenced_assets() {
        if !assets.join(&name).is_file() {
            problems.push(format!("image {} is missing from {}", name, assets.display()));
        }
    }

    if problems.is_empty() {
        println!(
            "{}: {} vertices, {} edges, no problems",
            path.display(),
            graph.vertex_count(),
            graph.edges().len()
        );
        return Ok(());
    }
    for problem in &problems {
        println!("- {}", problem);
    }
    Err(CliError::Invalid(problems.len()))
}

fn describe(path: &Path, json: bool) -> Result<(), CliError> {
    let graph = Graph::load_from_file(path)?;
    if json {
        println!("{}", graph.to_json()?);
        return Ok(());
    }

    println!("Vertices:");
    for vertex in graph.vertices() {
        let start = if vertex.is_start { " [start]" } else { "" };
        let image = vertex.template.as_deref().unwrap_or("-");
        println!("  {} ({}){} image={}", vertex.name, vertex.id, start, image);
    }

    let name = |id: Option<&str>| {
        id.map_or_else(
            || "(none)".to_string(),
            |id| graph.vertex(id).map_or_else(|| format!("?{}", id), |v| v.name.clone()),
        )
    };
    println!("Edges:");
    for edge in graph.edges() {
        let action = edge.action.as_ref().map_or("-", |a| a.kind.as_str());
        println!(
            "  {} -> {} on {} do {} (priority {}, max {}, every {})",
            name(edge.source_id.as_deref()),
            name(edge.target_id.as_deref()),
            edge.trigger.kind,
            action,
            edge.priority,
            edge.max_triggers,
            edge.effective_threshold()
        );
    }
    Ok(())
}

fn layout(path: &Path, force: bool) -> Result<(), CliError> {
    let graph = Graph::load_from_file(path)?;
    let positions = if force {
        Layout::auto(&graph)
    } else {
        Layout::load_or_auto(path, &graph)
    };
    positions.save(path)?;
    println!("Wrote {}", Layout::sidecar_path(path).display());
    Ok(())
}

#[cfg(feature = "desktop")]
fn run(
    cli: &Cli,
    path: &Path,
    window: &str,
    settings_path: Option<&Path>,
    background: bool,
    dry_run: bool,
) -> Result<(), CliError> {
    use state_graph_bot::input::{Beeper, InputInjector, LogBeeper, NoopInjector};
    use state_graph_bot::platform::{EnigoInjector, TerminalBell, XcapWindow};
    use state_graph_bot::vision::CaptureMode;
    use state_graph_bot::{Engine, EngineSettings};

    let graph = Graph::load_from_file(path)?;
    let mut settings = match settings_path {
        Some(file) => EngineSettings::load(file)?,
        None => EngineSettings::default(),
    }
    .with_assets_dir(&cli.assets);
    if background {
        settings = settings.with_capture_mode(CaptureMode::Background);
    }

    let target = XcapWindow::find(window)?;
    let (input, beeper): (Box<dyn InputInjector>, Box<dyn Beeper>) = if dry_run {
        (Box::new(NoopInjector), Box::new(LogBeeper))
    } else {
        (Box::new(EnigoInjector::new()?), Box::new(TerminalBell))
    };

    let names: std::collections::HashMap<String, String> = graph
        .vertices()
        .map(|v| (v.id.clone(), v.name.clone()))
        .collect();
    let mut engine = Engine::new(&graph, settings, Box::new(target), input, beeper).with_observer(
        move |id: &str| {
            println!("state: {}", names.get(id).map_or(id, String::as_str));
        },
    );

    engine.run()?;
    Ok(())
}
