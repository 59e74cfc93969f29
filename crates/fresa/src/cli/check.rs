use super::load_config;
use anyhow::{Context, Result};
use clap::Args;
use fresa_core::Program;
use std::path::PathBuf;

#[derive(Args)]
pub struct CheckArgs {
    /// G-code program to check.
    pub program: PathBuf,

    /// Path to the configuration file (TOML or JSON).
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl CheckArgs {
    pub fn run(&self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let program = Program::load(&self.program, &config.machine)
            .with_context(|| format!("failed to load {}", self.program.display()))?;

        print!("{program}");
        for diagnostic in program.diagnostics() {
            println!("{diagnostic}");
            for err in &diagnostic.source.errors {
                println!("    {err}");
            }
        }

        if !program.is_clean() {
            anyhow::bail!(
                "{} of {} blocks in {} failed to parse",
                program.diagnostics().len(),
                program.len(),
                self.program.display()
            );
        }
        tracing::info!(blocks = program.len(), "program is clean");
        Ok(())
    }
}
