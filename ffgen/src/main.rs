//! Compiles fixed-function pipeline descriptors from the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use itertools::Itertools;
use std::{fs, path::PathBuf};
use strum::IntoEnumIterator;
use tracing::{error, info};

use ffgen_core::{compile_pipeline, BuildConfig, CodegenMode, GeneratedProgram, OutputKind};
use ffgen_tracing::{init_logging, print_failure, print_success, print_warning, LoggingOptions};
use ffgen_types::{EnableWord, Feature, PipelineDescriptor, Target};

#[derive(Debug, Parser)]
#[clap(
    name = "ffgen",
    about = "Fixed-function transform and lighting vertex program generator.",
    version
)]
struct App {
    /// Use verbose output. `-v` for debug, `-vv` for every emitted instruction.
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Silence all log output. The program itself is still printed.
    #[clap(long, global = true)]
    silent: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile a JSON pipeline descriptor and print the program.
    Compile(CompileCommand),
    /// List every enable bit with its position in the raw enable words.
    Features,
}

#[derive(Debug, clap::Args)]
struct CompileCommand {
    /// Path to the pipeline descriptor.
    descriptor: PathBuf,
    #[clap(long, value_enum, default_value_t = Target::default())]
    target: Target,
    /// Store every instruction and encode once register placement is final.
    #[clap(long)]
    two_pass: bool,
    /// Emit portable instructions instead of hardware instructions.
    #[clap(long)]
    uniflex: bool,
    /// Print the stored instruction list before it is replayed.
    #[clap(long)]
    print_intermediate_asm: bool,
    /// Print the register usage tables as JSON instead of the listing.
    #[clap(long)]
    json: bool,
    /// Fail when an enabled feature is not handled by any pass.
    #[clap(long)]
    verify_feature_coverage: bool,
}

fn main() {
    let app = App::parse();
    init_logging(LoggingOptions {
        verbosity: app.verbose,
        silent: app.silent,
        ..Default::default()
    });
    if let Err(err) = run(app.command) {
        print_failure(&format!("Error: {err:?}"));
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Compile(command) => compile(command),
        Command::Features => {
            list_features();
            Ok(())
        }
    }
}

fn compile(command: CompileCommand) -> Result<()> {
    let text = fs::read_to_string(&command.descriptor)
        .with_context(|| format!("failed to read {}", command.descriptor.display()))?;
    let desc: PipelineDescriptor = serde_json::from_str(&text)
        .with_context(|| format!("invalid descriptor {}", command.descriptor.display()))?;

    let codegen = if command.two_pass {
        CodegenMode::TwoPass
    } else {
        CodegenMode::OnePass
    };
    let mut config = BuildConfig::new(command.target)
        .codegen(codegen)
        .print_intermediate_asm(command.print_intermediate_asm)
        .verify_feature_coverage(command.verify_feature_coverage);
    if command.uniflex {
        config = config.output(OutputKind::Uniflex);
    }

    let program = match compile_pipeline(&desc, &config) {
        Ok(program) => program,
        Err(err) => {
            error!("compilation for {} failed", command.target);
            return Err(err.into());
        }
    };
    for warning in &program.warnings {
        print_warning(&format!("warning: {warning}"));
    }
    if command.json {
        println!("{}", serde_json::to_string_pretty(&usage_tables(&program))?);
    } else {
        println!("{program}");
    }
    print_success(&format!(
        "Compiled {} instructions for {} ({} temporaries).",
        program.code.instruction_count(),
        command.target,
        program.temp_count
    ));
    Ok(())
}

fn usage_tables(program: &GeneratedProgram) -> serde_json::Value {
    serde_json::json!({
        "inputs": program.inputs,
        "outputs": program.outputs,
        "constants": program.constants,
        "temp_count": program.temp_count,
        "secondary_attribute_size": program.secondary_attribute_size,
        "memory_constant_size": program.memory_constant_size,
        "memory_constant_base_adjust": program.memory_constant_base_adjust,
        "words": program.words(),
    })
}

fn list_features() {
    let by_word = Feature::iter().into_group_map_by(|feature| feature.enable_bit().0);
    for word in [EnableWord::Enables1, EnableWord::Enables2] {
        info!("{word}:");
        for feature in by_word
            .get(&word)
            .into_iter()
            .flatten()
            .sorted_by_key(|feature| feature.enable_bit().1)
        {
            info!(
                "  bit {:>2}  {:#010x}  {feature}",
                feature.enable_bit().1,
                feature.mask()
            );
        }
    }
}
