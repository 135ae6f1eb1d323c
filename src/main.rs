//! `rust_scan`: run a scan against simulated hardware and print the result as JSON.
//!
//! ```text
//! rust_scan linear --start 0 --end 10 --steps 5 --zigzag --passes 2
//! rust_scan area --start 0,0 --end 1,2 --step-size 0.5
//! rust_scan vector --waypoint 0,0 --waypoint 1,2 --waypoint 3,3
//! ```
//!
//! Actuator, detector and monitor channel names come from the configuration
//! file (`rust_scan.toml`, see `rust_scan::config`). The simulated detector
//! reports the sum of the actuator readbacks, monitors report a constant.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use rust_scan::config::ScanSettings;
use rust_scan::core::Setpoints;
use rust_scan::hardware::mock::{MockChannelClient, MockFrameStream};
use rust_scan::logging::init_tracing;
use rust_scan::positioner::{
    AreaPositioner, LinearPositioner, Positioner, Step, VectorPositioner, ZigZagAreaPositioner,
    ZigZagLinearPositioner, ZigZagVectorPositioner,
};
use rust_scan::reader::SynchronizedReader;
use rust_scan::scan::{Scan, ScanCollector};
use rust_scan::writer::ActuatorWriter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Beamline scan engine (simulated hardware)")]
struct Cli {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    json_logs: bool,

    /// Period of the simulated acquisition stream, in milliseconds
    #[arg(long, default_value_t = 10)]
    frame_period_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// All axes move in lockstep
    Linear(GridArgs),
    /// Raster over every axis, the first axis changing slowest
    Area(GridArgs),
    /// Explicit waypoints
    Vector(VectorArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("step").required(true).args(["steps", "step_size"])))]
struct GridArgs {
    /// Start coordinate per axis
    #[arg(long, value_delimiter = ',', required = true, allow_negative_numbers = true)]
    start: Vec<f64>,

    /// End coordinate per axis
    #[arg(long, value_delimiter = ',', required = true, allow_negative_numbers = true)]
    end: Vec<f64>,

    /// Number of steps per axis
    #[arg(long, value_delimiter = ',')]
    steps: Vec<usize>,

    /// Step size per axis
    #[arg(long, value_delimiter = ',')]
    step_size: Vec<f64>,

    /// Offset added to start and end per axis
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    offsets: Option<Vec<f64>>,

    #[command(flatten)]
    traversal: TraversalArgs,
}

#[derive(Args, Debug)]
struct VectorArgs {
    /// One waypoint, comma separated coordinates (repeatable)
    #[arg(long = "waypoint", required = true, allow_negative_numbers = true)]
    waypoints: Vec<String>,

    /// Offset added to every waypoint
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    offsets: Option<Vec<f64>>,

    #[command(flatten)]
    traversal: TraversalArgs,
}

#[derive(Args, Debug)]
struct TraversalArgs {
    /// Number of passes
    #[arg(long, default_value_t = 1)]
    passes: usize,

    /// Reverse direction between sweeps
    #[arg(long)]
    zigzag: bool,
}

impl GridArgs {
    /// Per-axis steps; a single value applies to every axis.
    fn steps(&self) -> Vec<Step> {
        let steps: Vec<Step> = if self.steps.is_empty() {
            self.step_size.iter().copied().map(Step::Size).collect()
        } else {
            self.steps.iter().copied().map(Step::Count).collect()
        };
        match steps.as_slice() {
            [step] => vec![*step; self.start.len()],
            _ => steps,
        }
    }
}

fn parse_waypoint(text: &str) -> Result<Vec<f64>> {
    text.split(',')
        .map(|value| {
            value
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid coordinate '{value}' in waypoint '{text}'"))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => ScanSettings::load_from(path),
        None => ScanSettings::load(),
    }
    .context("loading configuration")?;
    init_tracing(&settings.log_level, cli.json_logs)?;

    let frame_period = Duration::from_millis(cli.frame_period_ms);
    let output = match &cli.command {
        Command::Linear(args) => {
            let (start, end, steps) = (&args.start, &args.end, args.steps());
            let (passes, offsets) = (args.traversal.passes, args.offsets.as_deref());
            if args.traversal.zigzag {
                let positioner =
                    ZigZagLinearPositioner::from_vectors(start, end, &steps, passes, offsets)?;
                run_scan(positioner, &settings, frame_period).await?
            } else {
                let positioner =
                    LinearPositioner::from_vectors(start, end, &steps, passes, offsets)?;
                run_scan(positioner, &settings, frame_period).await?
            }
        }
        Command::Area(args) => {
            let (start, end, steps) = (&args.start, &args.end, args.steps());
            let (passes, offsets) = (args.traversal.passes, args.offsets.as_deref());
            if args.traversal.zigzag {
                let positioner =
                    ZigZagAreaPositioner::from_vectors(start, end, &steps, passes, offsets)?;
                run_scan(positioner, &settings, frame_period).await?
            } else {
                let positioner = AreaPositioner::from_vectors(start, end, &steps, passes, offsets)?;
                run_scan(positioner, &settings, frame_period).await?
            }
        }
        Command::Vector(args) => {
            let waypoints = args
                .waypoints
                .iter()
                .map(|text| parse_waypoint(text))
                .collect::<Result<Vec<_>>>()?;
            let (passes, offsets) = (args.traversal.passes, args.offsets.as_deref());
            if args.traversal.zigzag {
                let positioner = ZigZagVectorPositioner::new(waypoints, passes, offsets)?;
                run_scan(positioner, &settings, frame_period).await?
            } else {
                let positioner = VectorPositioner::new(waypoints, passes, offsets)?;
                run_scan(positioner, &settings, frame_period).await?
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Runs `positioner` against simulated channels and returns the collected points.
async fn run_scan<P>(
    positioner: P,
    settings: &ScanSettings,
    frame_period: Duration,
) -> Result<serde_json::Value>
where
    P: Positioner,
    P::Position: Setpoints + Serialize,
{
    let n_setpoints = match positioner.positions().next() {
        Some(position) => position.setpoints().len(),
        None => bail!("scan has no positions"),
    };

    let writers = channel_names(&settings.channels.writers, "SIM:MOTOR", n_setpoints);
    let readers = channel_names(&settings.channels.readers, "SIM:DETECTOR", 1);
    let monitors = settings.channels.monitors.clone();
    if writers.len() != n_setpoints {
        bail!(
            "{} actuator channels configured, positions have {n_setpoints} coordinates",
            writers.len()
        );
    }

    let client = writers.iter().fold(MockChannelClient::new(), |client, name| {
        client.with_channel(name, 0.0)
    });
    let stream = simulated_stream(&client, &writers, &readers, &monitors, frame_period);

    let policy = settings.connection.retry_policy();
    let writer = ActuatorWriter::connect(client, &writers, &policy)
        .await?
        .with_poll_interval(settings.writer.poll_interval);
    let reader = SynchronizedReader::connect(
        stream,
        settings.stream.clone(),
        readers,
        monitors,
        settings.reader.read_timeout,
        &policy,
    )
    .await?;

    info!(positions = positioner.num_positions(), "running simulated scan");
    let mut collector = ScanCollector::new();
    Scan::new(
        positioner,
        writer,
        reader,
        settings.writer.tolerance,
        settings.writer.timeout,
    )
    .run(&mut collector)
    .await?;

    Ok(serde_json::to_value(collector.into_points())?)
}

fn channel_names(configured: &[String], prefix: &str, count: usize) -> Vec<String> {
    if configured.is_empty() {
        (0..count).map(|i| format!("{prefix}{i}")).collect()
    } else {
        configured.to_vec()
    }
}

/// Live stream whose detectors report the sum of the actuator readbacks.
fn simulated_stream(
    client: &MockChannelClient,
    writers: &[String],
    readers: &[String],
    monitors: &[String],
    frame_period: Duration,
) -> MockFrameStream {
    let client = client.clone();
    let writers = writers.to_vec();
    let readers = readers.to_vec();
    let monitors = monitors.to_vec();

    MockFrameStream::live(
        frame_period,
        Box::new(move || {
            let signal: f64 = writers.iter().filter_map(|name| client.value(name)).sum();
            let mut data = HashMap::new();
            for name in &readers {
                data.insert(name.clone(), json!(signal));
            }
            for name in &monitors {
                data.insert(name.clone(), json!(400.0));
            }
            data
        }),
    )
}
