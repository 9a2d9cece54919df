//! @ai:module:intent CLI entry point for the annotree extractor and checker
//! @ai:module:layer presentation
//! @ai:module:public_api main
//! @ai:module:depends_on config, scanner, collector, extractor, reader, output
//!
//! The CLI always runs to completion. `CancelToken` is for library embedders
//! that stop a run from another thread; the binary never sets it.

use annotree::{
    collect, extract_source, output, AnnotationPath, CancelToken, Collection, Config, Error,
    FailPolicy, LinkFormat, OutputFormat, Scanner,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "annotree")]
#[command(author, version, about = "Build a knowledge tree from @[Path] annotations in source comments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to annotree.toml in the scanned directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Output format
    #[arg(long, short, global = true, value_enum, default_value = "text")]
    format: Format,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the tree and report every diagnostic
    Check {
        /// File or directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Severity that makes the run fail (overrides [check] fail-on)
        #[arg(long, value_enum)]
        fail_on: Option<Policy>,

        /// Only scan files matching these globs (overrides [scan] include)
        #[arg(long)]
        include: Vec<String>,

        /// Skip files matching these globs (added to [scan] exclude)
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Print the merged tree
    Tree {
        /// File or directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List every place a node occurs, with source links
    Show {
        /// Node path such as Domain/Accumulator, or an alias
        node: String,

        /// File or directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Repository root for links (overrides [links] root)
        #[arg(long)]
        link_root: Option<String>,

        /// Link template with {root}, {path}, {line} and {column} (overrides [links] format)
        #[arg(long)]
        link_format: Option<String>,
    },

    /// Print the annotations and parse errors of one file
    Extract {
        /// Path to file
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    JsonPretty,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
            Format::JsonPretty => OutputFormat::JsonPretty,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    Error,
    Warning,
    Never,
}

impl From<Policy> for FailPolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::Error => FailPolicy::Error,
            Policy::Warning => FailPolicy::Warning,
            Policy::Never => FailPolicy::Never,
        }
    }
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// @ai:intent Explicit --config file, else annotree.toml next to the scanned path
/// @ai:effects fs:read
fn load_config(explicit: Option<&Path>, scanned: &Path) -> annotree::Result<Config> {
    match explicit {
        Some(path) => Config::load(path),
        None if scanned.is_file() => {
            Config::load_from_dir(scanned.parent().unwrap_or_else(|| Path::new(".")))
        }
        None => Config::load_from_dir(scanned),
    }
}

/// @ai:intent Scan, extract and merge everything under `path`
/// @ai:effects fs:read
fn run(config: &Config, path: &Path) -> annotree::Result<Collection> {
    let scanner = Scanner::new(&config.scan, config.dialects()?)?;
    let files = scanner.scan(path)?;
    Ok(collect(&files, &CancelToken::new()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    match execute(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn execute(cli: Cli) -> annotree::Result<ExitCode> {
    let format: OutputFormat = cli.format.into();

    match cli.command {
        Commands::Check {
            path,
            fail_on,
            include,
            exclude,
        } => {
            let mut config = load_config(cli.config.as_deref(), &path)?;
            if !include.is_empty() {
                config.scan.include = include;
            }
            config.scan.exclude.extend(exclude);
            let policy = fail_on.map(FailPolicy::from).unwrap_or(config.check.fail_on);
            let collection = run(&config, &path)?;

            println!("{}", output::format_report(&collection.report, format));

            if collection.report.fails(policy) {
                Ok(ExitCode::from(1))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }

        Commands::Tree { path } => {
            let config = load_config(cli.config.as_deref(), &path)?;
            let collection = run(&config, &path)?;

            println!("{}", output::format_tree(&collection.tree, format));
            Ok(ExitCode::SUCCESS)
        }

        Commands::Show {
            node,
            path,
            link_root,
            link_format,
        } => {
            let mut config = load_config(cli.config.as_deref(), &path)?;
            if link_root.is_some() {
                config.links.root = link_root;
            }
            if link_format.is_some() {
                config.links.format = link_format;
            }
            let links: Option<LinkFormat> = config.links.link_format();
            let collection = run(&config, &path)?;
            let tree = &collection.tree;

            let target = match tree.resolve_alias(&node) {
                Some(aliased) => aliased.clone(),
                None => AnnotationPath::parse(&node).map_err(|e| Error::InvalidPath {
                    path: node.clone(),
                    reason: e.to_string(),
                })?,
            };

            let Some(occurrences) = tree.occurrences(&target) else {
                eprintln!("No node at {}", target);
                return Ok(ExitCode::from(1));
            };

            println!(
                "{}",
                output::format_occurrences(&target, &occurrences, links.as_ref(), format)
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Extract { path } => {
            if !path.is_file() {
                return Err(Error::InvalidPath {
                    path: path.display().to_string(),
                    reason: "extract command requires a file path".to_string(),
                });
            }

            let mut config = load_config(cli.config.as_deref(), &path)?;
            config.scan.skip_unknown_files = false;
            let scanner = Scanner::new(&config.scan, config.dialects()?)?;

            for file in scanner.scan(&path)? {
                let parsed = extract_source(&file.path, &file.text, &file.dialect.syntax, file.dialect.as_ref());
                println!("{}", output::format_file_annotations(&parsed, format));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
