mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pulse-cli")]
#[command(about = "CodePulse CLI - Run code in the sandbox, preview harnesses, clean up runtime leftovers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a source file against test cases in a fresh container
    Run {
        /// Language name (python, javascript, go)
        #[arg(short, long)]
        language: String,

        /// File holding the function to test
        #[arg(short, long)]
        code_file: PathBuf,

        /// Starter snippet used to find the entry point (optional)
        #[arg(short, long)]
        snippet_file: Option<PathBuf>,

        /// JSON array of {input, output} test cases
        #[arg(short, long)]
        tests: PathBuf,

        /// Run every test case instead of the first two
        #[arg(long, default_value = "false")]
        submit: bool,

        /// Execution deadline in seconds (overrides PULSE_EXECUTION_TIMEOUT_SECS)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Print the generated harness program without touching Docker
    Render {
        /// Language name (python, javascript, go)
        #[arg(short, long)]
        language: String,

        /// File holding the function to test
        #[arg(short, long)]
        code_file: PathBuf,

        /// Starter snippet used to find the entry point (optional)
        #[arg(short, long)]
        snippet_file: Option<PathBuf>,

        /// JSON array of {input, output} test cases
        #[arg(short, long)]
        tests: PathBuf,
    },

    /// List supported languages
    Languages,

    /// Remove stale sandbox containers and dangling sandbox images
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            language,
            code_file,
            snippet_file,
            tests,
            submit,
            timeout_secs,
        } => {
            commands::run(
                &language,
                &code_file,
                snippet_file.as_deref(),
                &tests,
                submit,
                timeout_secs,
            )
            .await?;
        }
        Commands::Render {
            language,
            code_file,
            snippet_file,
            tests,
        } => {
            let program = commands::render(&language, &code_file, snippet_file.as_deref(), &tests)?;
            print!("{}", program);
        }
        Commands::Languages => {
            commands::list_languages();
        }
        Commands::Sweep => {
            commands::sweep().await?;
        }
    }

    Ok(())
}
