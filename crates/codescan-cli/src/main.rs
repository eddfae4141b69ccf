use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codescan_cli::{
    collect_source_files, exit_code, init_tracing, render_json, render_languages, render_pretty,
    CollectOptions,
};
use codescan_core::{CodeScanConfig, ConfigManager, LanguageMapping, Severity};
use codescan_parser::{LanguageRegistry, LanguageStatistics};
use codescan_pipeline::PipelineOrchestrator;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(name = "codescan")]
#[command(about = "CodeScan - deterministic static analysis for source trees", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./.codescan.toml, then ~/.codescan/config.toml)
    #[arg(short, long, global = true, env = "CODESCAN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a project directory
    Scan {
        /// Project root
        path: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        format: OutputFormat,

        /// Additional glob patterns to leave out
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Disable the AST cache
        #[arg(long)]
        no_cache: bool,

        /// Cyclomatic complexity threshold
        #[arg(long)]
        complexity_threshold: Option<u32>,

        /// Exit with status 1 when a finding at or above this severity exists
        #[arg(long, value_parser = parse_severity)]
        fail_on: Option<Severity>,

        /// Project id recorded on every result (defaults to the directory name)
        #[arg(long)]
        project_id: Option<String>,
    },

    /// Show the language breakdown of a project directory
    Languages {
        /// Project root
        path: PathBuf,
    },

    /// Write a default configuration file
    Init {
        /// Destination file
        #[arg(default_value = ".codescan.toml")]
        path: PathBuf,
    },
}

fn parse_severity(value: &str) -> Result<Severity, String> {
    value.parse()
}

fn load_config(path: Option<&Path>) -> Result<CodeScanConfig> {
    let manager = match path {
        Some(path) => ConfigManager::from_path(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;
    Ok(manager.into_config())
}

fn project_name(path: &Path) -> String {
    path.canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "project".to_string())
}

#[allow(clippy::too_many_arguments)]
async fn scan(
    mut config: CodeScanConfig,
    path: PathBuf,
    format: OutputFormat,
    exclude: Vec<String>,
    no_cache: bool,
    complexity_threshold: Option<u32>,
    fail_on: Option<Severity>,
    project_id: Option<String>,
) -> Result<i32> {
    let pipeline = &mut config.pipeline;
    pipeline.exclude_patterns.extend(exclude);
    if no_cache {
        pipeline.enable_caching = false;
    }
    if let Some(threshold) = complexity_threshold {
        pipeline.complexity_threshold = threshold;
    }
    ConfigManager::validate_config(&config).context("Invalid configuration")?;

    let options = CollectOptions {
        exclude_patterns: config.pipeline.exclude_patterns.clone(),
        max_file_size: config.pipeline.max_file_size,
    };
    let project_id = project_id.unwrap_or_else(|| project_name(&path));
    let orchestrator = PipelineOrchestrator::new(config.pipeline)?;

    let collected = collect_source_files(&path, &options);
    let result = orchestrator.analyze_collected(&project_id, collected).await;
    debug!(errors = result.errors.len(), "scan finished");

    match format {
        OutputFormat::Pretty => print!("{}", render_pretty(&result)),
        OutputFormat::Json => println!("{}", render_json(&result)?),
    }
    Ok(exit_code(&result, fail_on))
}

fn languages(path: &Path) -> Result<i32> {
    let files = collect_source_files(path, &CollectOptions::default())?;
    let registry = LanguageRegistry::new();
    let mappings: Vec<LanguageMapping> = files.iter().map(|f| registry.detect(f)).collect();
    let stats = LanguageStatistics::from_mappings(&mappings, &files);
    print!("{}", render_languages(&stats));
    Ok(0)
}

fn init(path: &Path) -> Result<i32> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    ConfigManager::create_default_config(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} {}", "Wrote".green(), path.display());
    Ok(0)
}

async fn run(cli: Cli) -> Result<i32> {
    if let Commands::Init { path } = &cli.command {
        return init(path);
    }
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Scan {
            path,
            format,
            exclude,
            no_cache,
            complexity_threshold,
            fail_on,
            project_id,
        } => {
            scan(
                config,
                path,
                format,
                exclude,
                no_cache,
                complexity_threshold,
                fail_on,
                project_id,
            )
            .await
        }
        Commands::Languages { path } => languages(&path),
        Commands::Init { path } => init(&path),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}
