use std::{fs, path::{Path, PathBuf}, sync::mpsc, time::Duration};

use clap::{ArgAction, Parser, Subcommand};
use glob::MatchOptions;
use notify::{RecursiveMode, Watcher};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use yw_parser::{Templates, YwFile};

mod convert;
mod ui;

use convert::{Config, Converter, Error, Outcome};
use ui::ConsoleUi;

const DEFAULT_CONFIG: &str = include_str!("../config.toml.default");
const CONFIG_FILE: &str = "yw2html.toml";


/// Converts yWriter projects to HTML and merges edited documents back
///
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {

    #[command(subcommand)]
    command: Command,

    /// Overwrite existing files without asking
    #[arg(short, long, global = true)]
    yes: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print every step
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// The configuration file. Defaults to yw2html.toml in the current directory, if present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Appended to the project name to name the HTML document
    #[arg(short, long, global = true)]
    suffix: Option<String>,

    /// Directory with template files
    #[arg(short, long, global = true)]
    templates: Option<PathBuf>,
}


#[derive(Debug, Subcommand)]
enum Command {
    /// Exports projects to HTML
    Export {
        /// Project files or glob patterns
        #[arg(required = true)]
        projects: Vec<String>,
    },
    /// Merges an edited HTML document back into its project, or creates a new project from it
    Import {
        /// The document to import
        document: PathBuf,
    },
    /// Exports a project or imports a document, depending on the file type
    Run {
        file: PathBuf,
    },
    /// Prints a project as JSON
    Dump {
        project: PathBuf,
        /// The file to write. Defaults to standard output
        out: Option<PathBuf>,
    },
    /// Writes the built-in templates into a directory, ready for editing
    Templates {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Writes a default configuration file
    Init {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Exports a project again whenever it changes
    Watch {
        project: PathBuf,
    },
}


type Result = anyhow::Result<(), anyhow::Error>;


fn init_logging(cli: &Cli) {
    let default = if cli.quiet {
        "warn"
    } else if cli.verbose > 0 {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let path = cli.config.clone().or_else(|| Some(PathBuf::from(CONFIG_FILE)).filter(|p| p.is_file()));
    let mut config = match path {
        Some(path) => {
            info!("using configuration \"{}\"", path.display());
            Config::load(&path)?
        }
        None => Config::default(),
    };
    if let Some(suffix) = &cli.suffix {
        config.suffix = suffix.clone();
    }
    if let Some(templates) = &cli.templates {
        config.templates = Some(templates.clone());
    }
    Ok(config)
}

/// Expands glob patterns. Patterns without matches are kept, so the conversion reports the missing file.
fn expand(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut res = vec![];
    for pattern in patterns {
        let mut matched = false;
        for path in glob::glob_with(pattern, MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        })?.flatten() {
            matched = true;
            res.push(path);
        }
        if !matched {
            res.push(PathBuf::from(pattern));
        }
    }
    Ok(res)
}

fn export(converter: &mut Converter<ConsoleUi>, projects: &[String]) -> Result {
    let projects = expand(projects)?;
    let mut failed = 0;
    for project in &projects {
        if let Err(e) = converter.export(project) {
            error!("{e}");
            failed += 1;
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} projects could not be exported", projects.len());
    }
    Ok(())
}

fn dump(converter: &Converter<ConsoleUi>, project: &Path, out: Option<PathBuf>) -> Result {
    let mut file = YwFile::new(project, converter.config.reader_config())?;
    let summary = file.read()?;
    for w in &summary.warnings {
        warn!("{w}");
    }
    let json = serde_json::to_string_pretty(&file.project)?;
    match out {
        Some(out) => fs::write(out, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn templates(dir: &Path) -> Result {
    if !dir.exists() {
        return Err(Error::DirNotFound(dir.display().to_string()).into());
    }
    for path in Templates::default().write_dir(dir)? {
        info!("wrote \"{}\"", path.display());
    }
    Ok(())
}

fn init(dir: &Path) -> Result {
    if !dir.exists() {
        return Err(Error::DirNotFound(dir.display().to_string()).into());
    }
    let path = dir.join(CONFIG_FILE);
    if path.exists() {
        warn!("configuration already exists: \"{}\"", path.display());
        return Ok(());
    }
    fs::write(&path, DEFAULT_CONFIG)?;
    info!("wrote \"{}\"", path.display());
    Ok(())
}

fn watch(converter: &mut Converter<ConsoleUi>, project: &Path) -> Result {
    converter.ui.assume_yes = true;
    if let Err(e) = converter.export(project) {
        error!("{e}");
    }
    let dir = match project.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
    let mut w = notify::recommended_watcher(tx)?;
    w.watch(&dir, RecursiveMode::NonRecursive)?;
    info!("watching \"{}\", press Ctrl-C to stop", project.display());
    let name = project.file_name();
    while let Ok(event) = rx.recv() {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        let relevant = (event.kind.is_modify() || event.kind.is_create())
            && event.paths.iter().any(|p| p.file_name() == name);
        if !relevant {
            continue;
        }
        // Saving fires a burst of events.
        std::thread::sleep(Duration::from_millis(200));
        rx.try_iter().for_each(drop);
        match converter.export(project) {
            Ok(Outcome::Written(path)) => info!("updated \"{}\"", path.display()),
            Ok(Outcome::Aborted) => {}
            Err(e) => error!("{e}"),
        }
    }
    Ok(())
}

fn main() -> Result {
    let cli = Cli::parse();
    init_logging(&cli);
    let config = load_config(&cli)?;
    let mut converter = Converter::new(ConsoleUi { assume_yes: cli.yes }, config);
    match cli.command {
        Command::Export { projects } => export(&mut converter, &projects)?,
        Command::Import { document } => {
            converter.import(&document)?;
        }
        Command::Run { file } => {
            converter.run(&file)?;
        }
        Command::Dump { project, out } => dump(&converter, &project, out)?,
        Command::Templates { dir } => templates(&dir)?,
        Command::Init { dir } => init(&dir)?,
        Command::Watch { project } => watch(&mut converter, &project)?,
    }
    Ok(())
}
