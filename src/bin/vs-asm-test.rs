// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use grate::core::asm_test::{parse_expected, parse_fs_uniform, parse_vs_uniform, AsmTest, TestReport};
use grate::core::config::Options;
use grate::core::error::{GrateError, Result};
use grate::core::grate::Grate;
use grate::core::host1x::{Host1x, SoftHost1x};

/// Vertex shader assembly test
#[derive(Parser)]
#[command(name = "vs-asm-test")]
#[command(about = "Run a shader assembly test on the Tegra 3D pipeline", long_about = None)]
struct Args {
    /// Vertex shader assembly file
    #[arg(long, required_unless_present = "manifest")]
    vs: Option<PathBuf>,

    /// Fragment shader assembly file
    #[arg(long, required_unless_present = "manifest")]
    fs: Option<PathBuf>,

    /// Linker assembly file
    #[arg(long, required_unless_present = "manifest")]
    lnk: Option<PathBuf>,

    /// Expected first pixel, e.g. 0xFF0000FE
    #[arg(long)]
    expected: Option<String>,

    /// Skip dumps and presentation
    #[arg(long)]
    testonly: bool,

    /// Vertex uniform, e.g. ["offset"]=(0,0,0,0)
    #[arg(long = "vs-uniform", value_name = "UNIFORM")]
    vs_uniforms: Vec<String>,

    /// Fragment uniform, e.g. ["alpha"]=1.0
    #[arg(long = "fs-uniform", value_name = "UNIFORM")]
    fs_uniforms: Vec<String>,

    /// TOML test manifest; replaces the shader and expectation arguments
    #[arg(long, conflicts_with_all = ["vs", "fs", "lnk"])]
    manifest: Option<PathBuf>,

    /// Write a JSON report of the run to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// TOML options file; command line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Present on the whole display
    #[arg(long)]
    fullscreen: bool,

    /// Synchronize presentation to vertical blanking
    #[arg(long)]
    vsync: bool,

    /// Output width
    #[arg(long)]
    width: Option<u32>,

    /// Output height
    #[arg(long)]
    height: Option<u32>,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn options(&self) -> Result<Options> {
        let mut options = match &self.config {
            Some(path) => Options::from_toml_file(path)?,
            None => Options::default(),
        };

        options.fullscreen |= self.fullscreen;
        options.vsync |= self.vsync;
        options.verbose |= self.verbose;
        if let Some(width) = self.width {
            options.width = width;
        }
        if let Some(height) = self.height {
            options.height = height;
        }

        Ok(options)
    }

    fn test(&self) -> Result<AsmTest> {
        let mut test = match (&self.manifest, &self.vs, &self.fs, &self.lnk) {
            (Some(manifest), _, _, _) => AsmTest::from_toml_file(manifest)?,
            (None, Some(vs), Some(fs), Some(lnk)) => AsmTest::new(vs.clone(), fs.clone(), lnk.clone()),
            _ => {
                return Err(GrateError::Parse(
                    "--vs, --fs and --lnk are required without --manifest".to_string(),
                ))
            }
        };

        if let Some(expected) = &self.expected {
            test.expected = Some(parse_expected(expected)?);
        }
        test.test_only |= self.testonly;

        for arg in &self.vs_uniforms {
            test.add_vs_uniform(parse_vs_uniform(arg)?)?;
        }
        for arg in &self.fs_uniforms {
            test.add_fs_uniform(parse_fs_uniform(arg)?)?;
        }

        Ok(test)
    }
}

fn run(args: &Args, options: Options) -> Result<bool> {
    let test = args.test()?;

    let host1x: Rc<dyn Host1x> = Rc::new(SoftHost1x::new());
    let mut grate = Grate::init(options, host1x);

    let outcome = test.run(&mut grate)?;

    match outcome.expected {
        Some(_) if outcome.passed => info!("Test passed: 0x{:08X}", outcome.result),
        Some(_) => {}
        None => info!("Result: 0x{:08X}", outcome.result),
    }

    if let Some(path) = &args.report {
        TestReport::new(&test, &outcome, grate.chip_id()).write_to_file(path)?;
    }

    Ok(outcome.passed)
}

fn main() -> ExitCode {
    // Load .env before the logger reads RUST_LOG
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let args = Args::parse();

    // The log level comes from the merged options
    let options = args.options();
    let verbose = options.as_ref().map_or(args.verbose, |options| options.verbose);

    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    info!("vs-asm-test v{}", env!("CARGO_PKG_VERSION"));

    match options.and_then(|options| run(&args, options)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
