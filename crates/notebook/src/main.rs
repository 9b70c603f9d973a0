use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use notebook::settings::{self, AppSettings};
use notebook::{CellRun, ExecutionEngine, NotebookSource, Runtime, SessionRegistry, TabId};
use notebook_doc::{load_notebook, Cell, CellKind, OutputRecord, OutputView};

#[derive(Parser, Debug)]
#[command(name = "notebook", about = "View, create and run .ipynb notebooks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Settings file to use instead of the one in the user config directory
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Interpreter command for Python cells, overriding settings
    #[arg(long, global = true)]
    interpreter: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a notebook's cells and outputs
    Show { path: PathBuf },

    /// Run notebooks and print their outputs
    Run {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Run only the cell at this index
        #[arg(long)]
        cell: Option<usize>,

        /// Write outputs back to each notebook
        #[arg(long)]
        save: bool,
    },

    /// Create a notebook with one empty code cell
    New {
        path: PathBuf,

        /// Runtime for the notebook (python, deno). Falls back to settings.
        #[arg(long, short)]
        runtime: Option<Runtime>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let mut app_settings = match &cli.settings {
        Some(path) => settings::load_settings_from(path)?,
        None => settings::load_settings(),
    };
    if let Some(command) = &cli.interpreter {
        app_settings.set_interpreter_command(&Runtime::Python, command);
    }

    match cli.command {
        Commands::Show { path } => show(&path),
        Commands::Run { paths, cell, save } => run(app_settings, &paths, cell, save).await,
        Commands::New { path, runtime } => {
            new_notebook(&path, runtime.unwrap_or(app_settings.default_runtime))
        }
    }
}

fn show(path: &Path) -> Result<()> {
    let doc = load_notebook(path)?;
    let mut out = String::new();
    for (index, cell) in doc.cells().iter().enumerate() {
        write_cell(&mut out, index, cell)?;
    }
    print!("{}", out);
    Ok(())
}

fn new_notebook(path: &Path, runtime: Runtime) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    let registry = SessionRegistry::new();
    let tab = TabId::new(path.display().to_string());
    let session = registry.open_or_focus(NotebookSource::Empty(runtime), tab)?;
    let mut state = session.lock();
    state.add_cell(CellKind::Code)?;
    state.save_as(path)?;
    println!("Created {}", path.display());
    Ok(())
}

async fn run(
    app_settings: AppSettings,
    paths: &[PathBuf],
    cell: Option<usize>,
    save: bool,
) -> Result<()> {
    let registry = SessionRegistry::new();
    let engine = ExecutionEngine::new(app_settings);

    // Each path gets its own tab, even if the same file is listed twice.
    let runs = paths.iter().enumerate().map(|(n, path)| {
        let tab = TabId::new(format!("{}:{}", n, path.display()));
        run_notebook(&registry, &engine, tab, path, cell, save)
    });
    let reports = futures::future::join_all(runs).await;

    let mut failed = 0;
    for report in reports {
        match report {
            Ok((text, errors)) => {
                print!("{}", text);
                failed += errors;
            }
            Err(e) => {
                eprintln!("Error: {:#}", e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} cell(s) or notebook(s) failed", failed);
    }
    Ok(())
}

/// Run one notebook in its own tab. Returns the printable report and the
/// number of cells that produced an error.
async fn run_notebook(
    registry: &SessionRegistry,
    engine: &ExecutionEngine,
    tab: TabId,
    path: &Path,
    cell: Option<usize>,
    save: bool,
) -> Result<(String, usize)> {
    let session = registry
        .open_or_focus(NotebookSource::Path(path.to_path_buf()), tab.clone())
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let runs: Vec<CellRun> = match cell {
        Some(index) => vec![registry.run_cell(engine, &tab, index).await?],
        None => registry
            .run_all(engine, &tab)
            .await?
            .into_iter()
            .map(|(_, run)| run)
            .collect(),
    };
    let errors = runs.iter().filter(|run| run.has_error()).count();
    info!(
        "[run] {}: {} cells run, {} with errors",
        path.display(),
        runs.len(),
        errors
    );

    let mut out = String::new();
    writeln!(out, "== {} ==", path.display())?;
    {
        let mut state = session.lock();
        for (index, cell) in state.document.cells().iter().enumerate() {
            write_cell(&mut out, index, cell)?;
        }
        if save {
            state.save()?;
        }
    }
    registry.close(&tab);
    Ok((out, errors))
}

fn write_cell(out: &mut String, index: usize, cell: &Cell) -> std::fmt::Result {
    match cell.execution_count() {
        Some(count) => writeln!(out, "[{}] {} ({})", index, cell.kind(), count)?,
        None => writeln!(out, "[{}] {}", index, cell.kind())?,
    }
    for line in cell.source.lines() {
        writeln!(out, "    {}", line)?;
    }
    for output in cell.outputs() {
        write_output(out, output)?;
    }
    Ok(())
}

fn write_output(out: &mut String, output: &OutputRecord) -> std::fmt::Result {
    match output.preferred_view() {
        Some(OutputView::Text(text)) => {
            for line in text.lines() {
                writeln!(out, "  | {}", line)?;
            }
        }
        Some(OutputView::Html(html)) => writeln!(out, "  | <html: {} bytes>", html.len())?,
        Some(OutputView::Image { mime, bytes }) => {
            writeln!(out, "  | <{}: {} bytes>", mime, bytes.len())?
        }
        None => writeln!(out, "  | <{} without a displayable type>", output.output_type())?,
    }
    Ok(())
}
