use anyhow::Result;
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

const SAMPLE_PROGRAM: &str = "crates/fresa-core/test-data/sample.gcode";
const SAMPLE_CONFIG: &str = "config/machine.toml";

#[derive(Parser)]
#[command(name = "xtask")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the CI checks: rustfmt, clippy and tests.
    Ci,
    /// Apply rustfmt to the workspace.
    Fmt,
    /// Run the workspace tests.
    Test {
        /// Extra arguments passed through to cargo test
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Interpolate the sample program and write the setpoints to a CSV file.
    Sample {
        #[arg(long, default_value = "target/sample.csv")]
        output: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root());

    match cli.command {
        Command::Ci => {
            eprintln!("Checking formatting...");
            cmd!(sh, "cargo fmt --all -- --check").run()?;
            eprintln!("Running clippy...");
            cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
            eprintln!("Running tests...");
            cmd!(sh, "cargo test --workspace").run()?;
        }
        Command::Fmt => cmd!(sh, "cargo fmt --all").run()?,
        Command::Test { args } => cmd!(sh, "cargo test --workspace {args...}").run()?,
        Command::Sample { output } => {
            cmd!(
                sh,
                "cargo run -p fresa -- run {SAMPLE_PROGRAM} --config {SAMPLE_CONFIG} --output {output}"
            )
            .run()?;
            eprintln!("Setpoints written to {output}");
        }
    }
    Ok(())
}

fn workspace_root() -> std::path::PathBuf {
    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .unwrap_or(manifest_dir)
        .to_path_buf()
}
