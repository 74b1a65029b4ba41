use std::path::{Path, PathBuf};

use clap::{ArgAction, CommandFactory, Parser as ClapParser, error::ErrorKind};
use colored::Colorize;
use schemec::{
    CompileError, compile_source,
    frontend::{SourceFile, SourceFileOrigin},
    middle::{
        codegen::{CodegenOptions, ErrorPolicy},
        ir,
    },
};
use tracing::{Level, info};

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Source files to compile, one module each
    source_files: Vec<PathBuf>,

    /// Write the IR to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Name of the function holding the top level forms
    #[arg(long, default_value = "main")]
    entry: String,

    /// Skip functions that fail to compile and report them at the end
    #[arg(long)]
    keep_going: bool,

    /// Colorize the emitted IR
    #[arg(long)]
    pretty: bool,

    /// Log more; repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn codegen_options(&self, source_file: &Path) -> CodegenOptions {
        CodegenOptions {
            module_name: source_file
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "module".to_string()),
            entry_name: self.entry.clone(),
            error_policy: if self.keep_going {
                ErrorPolicy::KeepGoing
            } else {
                ErrorPolicy::Abort
            },
        }
    }
}

fn report_error(source_file: &SourceFile, error: &CompileError) -> ! {
    match error {
        CompileError::Read(error) => {
            eprintln!(
                "{} {} ({})",
                "error:".red().bold(),
                error,
                source_file.format_span_position(error.span)
            );
            source_file.highlight_span(error.span);
        }
        CompileError::Codegen(diagnostic) => {
            eprintln!(
                "{} {} ({})",
                "error:".red().bold(),
                diagnostic,
                source_file.origin
            );
        }
    }

    std::process::exit(1);
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if args.source_files.is_empty() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source files!")
            .exit();
    }

    for source_file in &args.source_files {
        if !source_file.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Source file '{}' does not exist!", source_file.display()),
                )
                .exit()
        }
    }

    /* Compile each file into its own module */

    let mut emitted = Vec::new();
    let mut skipped = 0;

    for path in &args.source_files {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) => Args::command()
                .error(
                    ErrorKind::Io,
                    format!("Failed to read '{}': {error}", path.display()),
                )
                .exit(),
        };

        let source_file = SourceFile {
            contents,
            origin: SourceFileOrigin::File(path.clone()),
        };

        let output = match compile_source(&source_file, &args.codegen_options(path)) {
            Ok(output) => output,
            Err(error) => report_error(&source_file, &error),
        };

        for diagnostic in &output.diagnostics {
            eprintln!(
                "{} {} ({})",
                "warning:".yellow().bold(),
                diagnostic,
                source_file.origin
            );
        }
        skipped += output.diagnostics.len();

        info!(file = %path.display(), "compiled");

        emitted.push(if args.pretty {
            output.module.to_string()
        } else {
            ir::render(&output.module)
        });
    }

    /* Emit */

    let text = emitted.join("\n");

    match &args.output {
        Some(path) => {
            if let Err(error) = std::fs::write(path, text) {
                Args::command()
                    .error(
                        ErrorKind::Io,
                        format!("Failed to write '{}': {error}", path.display()),
                    )
                    .exit()
            }
        }
        None => print!("{text}"),
    }

    if skipped > 0 {
        eprintln!(
            "{} {skipped} function(s) could not be compiled",
            "error:".red().bold()
        );
        std::process::exit(1);
    }
}
