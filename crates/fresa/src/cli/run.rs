use super::load_config;
use crate::{
    config::Config,
    telemetry::{MachineState, TelemetryLink},
};
use anyhow::{Context, Result};
use clap::Args;
use fresa_core::{Block, Point, Program};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
    time::Duration,
};
use tokio::time::MissedTickBehavior;

const CSV_HEADER: &str = "n,t,lambda,s,feed,x,y,z";

#[derive(Args)]
pub struct RunArgs {
    /// G-code program to run.
    pub program: PathBuf,

    /// Path to the configuration file (TOML or JSON).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write setpoints to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pace setpoints at the sampling period instead of as fast as possible.
    #[arg(long)]
    pub realtime: bool,

    /// Publish setpoints over MQTT (needs a [telemetry] section).
    #[arg(long)]
    pub publish: bool,

    /// Run the valid blocks of a program that has parse errors.
    #[arg(long)]
    pub keep_going: bool,
}

impl RunArgs {
    pub fn run(&self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let program = Program::load(&self.program, &config.machine)
            .with_context(|| format!("failed to load {}", self.program.display()))?;

        if !program.is_clean() {
            for diagnostic in program.diagnostics() {
                tracing::error!("{diagnostic}");
            }
            if !self.keep_going {
                anyhow::bail!(
                    "{} block(s) failed to parse, rerun with --keep-going to skip them",
                    program.diagnostics().len()
                );
            }
        }

        let mut out: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
                format!("failed to create output file {}", path.display())
            })?)),
            None => Box::new(BufWriter::new(io::stdout().lock())),
        };

        execute(&program, &config, self, &mut out)
    }
}

/// One setpoint of the interpolation stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub n: u64,
    pub t: f64,
    pub lambda: f64,
    /// Distance along the block
    pub s: f64,
    /// Feed, distance/min
    pub feed: f64,
    pub point: Point,
}

/// Sample `block` at every tick of its profile, from `t = 0` to the end
/// inclusive, shifted by `offset`. Both ends are emitted, so the joint
/// between two blocks is held for one extra tick.
pub fn samples<'a>(block: &'a Block<'_>, offset: Point) -> impl Iterator<Item = Sample> + 'a {
    let tq = block.machine().tq;
    let ticks = block.profile().map_or(0, |p| p.ticks);
    (0..=ticks).filter_map(move |k| {
        let t = k as f64 * tq;
        let (lambda, feed) = block.lambda(t);
        let point = block.interpolate(lambda).ok()?;
        Some(Sample {
            n: block.n(),
            t,
            lambda,
            s: lambda * block.length(),
            feed,
            point: point.offset_by(&offset),
        })
    })
}

fn write_row(out: &mut dyn Write, sample: &Sample) -> io::Result<()> {
    writeln!(
        out,
        "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
        sample.n,
        sample.t,
        sample.lambda,
        sample.s,
        sample.feed,
        sample.point.x(),
        sample.point.y(),
        sample.point.z()
    )
}

#[tokio::main]
async fn execute(
    program: &Program<'_>,
    config: &Config,
    args: &RunArgs,
    out: &mut dyn Write,
) -> Result<()> {
    let machine = program.machine();

    let mut link = match (&config.telemetry, args.publish) {
        (Some(telemetry), true) => Some(
            TelemetryLink::connect(telemetry)
                .await
                .context("failed to connect telemetry")?,
        ),
        (None, true) => anyhow::bail!("--publish needs a [telemetry] section in the config"),
        _ => None,
    };

    let mut ticker = if args.realtime {
        let mut interval = tokio::time::interval(Duration::from_secs_f64(machine.tq));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Some(interval)
    } else {
        None
    };

    let offset = machine.offset();
    let mut state = MachineState::new(machine);
    writeln!(out, "{CSV_HEADER}")?;

    for (index, block) in program.blocks().iter().enumerate() {
        if !block.kind().is_interpolated() {
            continue;
        }
        if !program.is_valid(index) {
            tracing::warn!(n = block.n(), line = block.line(), "skipping invalid block");
            continue;
        }
        tracing::info!(n = block.n(), "Interpolating block {}", block.line());

        for sample in samples(block, offset) {
            if let Some(ticker) = ticker.as_mut() {
                ticker.tick().await;
            }
            write_row(out, &sample)?;
            state.setpoint = sample.point;

            if let Some(link) = link.as_mut() {
                link.publish(&sample.point).await?;
                while let Some(feedback) = link.try_feedback() {
                    state.apply(feedback);
                }
            }
        }

        tracing::debug!(
            n = block.n(),
            setpoint = %state.setpoint,
            position = %state.position,
            error = state.error,
            "block done"
        );
    }

    out.flush()?;
    if let Some(link) = link {
        link.disconnect().await?;
    }
    Ok(())
}
