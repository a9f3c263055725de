use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde_sarif::sarif::Invocation;
use tracing::{info, Level};

use declass::ast::{ClassDeclaration, MemberDeclaration};
use declass::engine::{self, Options, DEFAULT_MAX_INSTRUCTIONS};
use declass::report::{build_sarif, degraded_results};
use declass::resolver::{ChainedSource, ClassInfoSource, LoaderSource, MapSource, TypeResolver};
use declass::scan::{scan_inputs, ClassPath, ScanOutput};

/// CLI arguments for declass execution.
#[derive(Parser, Debug)]
#[command(
    name = "declass",
    about = "Reconstructs structured Java syntax trees from JVM class files and JAR files.",
    version
)]
struct Cli {
    /// Class file, JAR file or directory to reconstruct.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Directories and JAR files consulted for referenced classes.
    #[arg(long, value_name = "PATH")]
    classpath: Vec<PathBuf>,
    /// Destination of the JSON syntax trees; `-` or absent for stdout.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Writes a SARIF report of methods emitted as raw listings.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    #[arg(long)]
    strict: bool,
    #[arg(long)]
    realign_lines: bool,
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_INSTRUCTIONS)]
    max_instructions: usize,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
    #[arg(long, value_name = "LEVEL", default_value_t = Level::WARN)]
    log_level: Level,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }
    for entry in &cli.classpath {
        if !entry.exists() {
            anyhow::bail!("classpath entry not found: {}", entry.display());
        }
    }
    if !cli.quiet {
        init_logging(cli.log_level)?;
    }

    let started_at = Instant::now();
    let ScanOutput { classes, artifacts } = scan_inputs(&cli.input)?;
    let classes: Vec<_> = classes.into_iter().map(|scanned| scanned.class).collect();
    let class_path = ClassPath::new(&cli.classpath)?;
    let sources: Vec<Box<dyn ClassInfoSource>> = vec![
        Box::new(MapSource::from_classes(&classes)),
        Box::new(LoaderSource::new(class_path)),
    ];
    let resolver = TypeResolver::new(ChainedSource::new(sources));
    let options = Options {
        realign_line_numbers: cli.realign_lines,
        strict: cli.strict,
        max_instructions: cli.max_instructions,
    };
    info!(classes = classes.len(), "reconstructing");

    let declarations = engine::decompile_classes(&classes, &resolver, &options)
        .context("failed to reconstruct classes")?;

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &declarations)
        .context("failed to serialize syntax trees")?;
    writer
        .write_all(b"\n")
        .context("failed to write syntax trees")?;

    if let Some(path) = cli.report.as_deref() {
        let sarif = build_sarif(degraded_results(&declarations), artifacts, build_invocation());
        let file =
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?;
        serde_json::to_writer_pretty(file, &sarif).context("failed to serialize SARIF output")?;
    }

    if cli.timing && !cli.quiet {
        let (methods, degraded) = count_methods(&declarations);
        eprintln!(
            "timing: total_ms={} classes={} methods={} degraded={}",
            started_at.elapsed().as_millis(),
            classes.len(),
            methods,
            degraded
        );
    }

    Ok(())
}

fn init_logging(level: Level) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to install logger")
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

fn build_invocation() -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");

    Invocation::builder()
        .execution_successful(true)
        .arguments(arguments)
        .command_line(command_line)
        .build()
}

/// Total and degraded method counts, nested classes included.
fn count_methods(classes: &[ClassDeclaration]) -> (usize, usize) {
    let mut methods = 0;
    let mut degraded = 0;
    for class in classes {
        for member in &class.members {
            match member {
                MemberDeclaration::Method(method) => {
                    methods += 1;
                    if method.body.is_raw() {
                        degraded += 1;
                    }
                }
                MemberDeclaration::Type(inner) => {
                    let (inner_methods, inner_degraded) =
                        count_methods(std::slice::from_ref(inner));
                    methods += inner_methods;
                    degraded += inner_degraded;
                }
                MemberDeclaration::Field(_) => {}
            }
        }
    }
    (methods, degraded)
}
