use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Instant;

/// Sample test run by `ci` after the unit tests
const DEFAULT_MANIFEST: &str = "asm/passthrough.toml";

#[derive(Parser)]
#[command(name = "x")]
#[command(about = "Development automation for grate")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Format check, clippy, tests and the sample shader test
    Ci,
    /// Format code
    Fmt {
        #[arg(long)]
        check: bool,
    },
    /// Run clippy with warnings denied
    Clippy,
    /// Run tests, optionally limited to some modules
    Test {
        /// Doc tests only
        #[arg(long)]
        doc: bool,
        /// Module filters, e.g. gr3d, shader, framebuffer, wrap
        #[arg(value_parser = ["bo", "gr3d", "shader", "framebuffer", "wrap", "asm_test"])]
        modules: Vec<String>,
    },
    /// Run benchmarks
    Bench,
    /// Run a shader assembly test from a manifest
    AsmTest {
        /// Path to the test manifest
        #[arg(default_value = DEFAULT_MANIFEST)]
        manifest: String,
        /// Write a JSON report to this file
        #[arg(long)]
        report: Option<String>,
        /// Build in release mode
        #[arg(long)]
        release: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci => run_ci(),
        Commands::Fmt { check } => cargo(fmt_args(check)),
        Commands::Clippy => cargo(clippy_args()),
        Commands::Test { doc, modules } => run_test(doc, &modules),
        Commands::Bench => cargo(vec!["bench"]),
        Commands::AsmTest {
            manifest,
            report,
            release,
        } => run_asm_test(&manifest, report.as_deref(), release),
    }
}

fn fmt_args(check: bool) -> Vec<&'static str> {
    if check {
        vec!["fmt", "--all", "--", "--check"]
    } else {
        vec!["fmt", "--all"]
    }
}

fn clippy_args() -> Vec<&'static str> {
    vec!["clippy", "--all-targets", "--", "-D", "warnings"]
}

fn run_ci() -> Result<()> {
    println!("{}", "=== grate CI ===".bold().blue());
    let start = Instant::now();

    let steps: [(&str, Box<dyn Fn() -> Result<()>>); 4] = [
        ("rustfmt", Box::new(|| cargo(fmt_args(true)))),
        ("clippy", Box::new(|| cargo(clippy_args()))),
        ("tests", Box::new(|| run_test(false, &[]))),
        ("sample shader test", Box::new(|| run_asm_test(DEFAULT_MANIFEST, None, false))),
    ];

    for (name, step) in &steps {
        println!("{} {}", "→".blue(), name.bold());
        if let Err(e) = step() {
            println!("{} {} failed", "✗".red().bold(), name);
            return Err(e);
        }
    }

    println!(
        "\n{} {:.2}s",
        "✓ CI passed in".green().bold(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

fn run_test(doc: bool, modules: &[String]) -> Result<()> {
    if doc {
        return cargo(vec!["test", "--doc"]);
    }

    if modules.is_empty() {
        return cargo(vec!["test"]);
    }

    let mut failed = Vec::new();

    for module in modules {
        let filter = format!("core::{}", module);
        println!("{} core::{} tests", "→".blue(), module.bold());

        match cargo(vec!["test", "--lib", filter.as_str()]) {
            Ok(()) => println!("{} {}\n", "✓".green(), module),
            Err(_) => {
                println!("{} {}\n", "✗".red(), module);
                failed.push(module.as_str());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("tests failed in: {}", failed.join(", "))
    }
}

fn run_asm_test(manifest: &str, report: Option<&str>, release: bool) -> Result<()> {
    if !Path::new(manifest).exists() {
        println!("{} no manifest at {}", "✗".red().bold(), manifest.yellow());
        anyhow::bail!("Manifest not found");
    }

    println!(
        "{} {} ({})",
        "→".blue(),
        manifest.cyan(),
        if release { "release".green() } else { "debug".yellow() }
    );

    let mut args = vec!["run"];
    if release {
        args.push("--release");
    }
    args.extend(["--bin", "vs-asm-test", "--", "--manifest", manifest]);
    if let Some(report) = report {
        args.extend(["--report", report]);
    }

    let start = Instant::now();
    cargo(args)?;

    println!(
        "{} passed in {:.2}s",
        "✓".green().bold(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Run `cargo` with `args`, inheriting stdio
fn cargo(args: Vec<&str>) -> Result<()> {
    let status = Command::new("cargo")
        .args(&args)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()?;

    if !status.success() {
        anyhow::bail!("cargo {} failed: {}", args.join(" "), status);
    }

    Ok(())
}
