use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use jqmb_slurper::{
    args::{convert_filter, Args},
    capture::ToneSource,
    sink::{FileSink, PublishSink, UdpSink},
    Pipeline, ShutdownMode,
};
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    // Get CLI args
    let args = Args::parse();
    // Set the logging level
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    // Setup the exit handler
    let stop = Arc::new(AtomicBool::new(false));
    let s = stop.clone();
    ctrlc::set_handler(move || {
        warn!("Got Ctrl-C, shutting down");
        s.store(true, Ordering::Release);
    })
    .context("failed to install Ctrl-C handler")?;

    let sink: Box<dyn PublishSink + Send> = match args.udp {
        Some(target) => Box::new(UdpSink::connect(target).context("failed to open UDP sink")?),
        None => Box::new(
            FileSink::create(&args.output_dir).context("failed to create capture file")?,
        ),
    };
    let source = ToneSource::new(args.tone_hz, args.tone_amplitude);

    let pipeline = Pipeline::spawn(args.pipeline_config(), source, sink)?;

    let start = Instant::now();
    let deadline = args.duration_secs.map(Duration::from_secs);
    let stats_interval = Duration::from_millis(args.stats_interval_ms);
    let mut last_report = Instant::now();
    while !stop.load(Ordering::Acquire) {
        if deadline.map_or(false, |d| start.elapsed() >= d) {
            break;
        }
        thread::sleep(Duration::from_millis(50));
        if last_report.elapsed() >= stats_interval {
            last_report = Instant::now();
            let stats = pipeline.stats();
            info!(%stats, lost = stats.blocks_lost(), "Pipeline status");
        }
    }

    pipeline.shutdown(ShutdownMode::Drain)?;
    Ok(())
}
