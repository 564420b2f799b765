//! Argument parsing for running from the command line

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;

use crate::{exfil::FrameClock, pipeline::PipelineConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Hexadecimal (sans leading 0x) device id stamped into every frame
    #[clap(short, long, value_parser = valid_dev_id, default_value = "0")]
    pub dev_id: u32,
    /// Send frames as UDP datagrams to this address instead of writing a capture file
    #[clap(short, long)]
    pub udp: Option<SocketAddr>,
    /// Directory for the capture file when not sending over UDP
    #[clap(short, long, default_value = ".")]
    pub output_dir: PathBuf,
    /// Topic hint handed to the publish sink
    #[clap(short, long, default_value = crate::exfil::DEFAULT_TOPIC)]
    pub topic: String,
    /// Capture ring capacity in blocks
    #[clap(long, default_value_t = 8)]
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    pub ring_capacity: u64,
    /// Batch queue depth in blocks
    #[clap(long, default_value_t = 256)]
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    pub queue_depth: u64,
    /// Decimated blocks per frame
    #[clap(short = 'k', long, default_value_t = 4)]
    #[clap(value_parser = clap::value_parser!(u16).range(1..))]
    pub blocks_per_batch: u16,
    /// Transfer stage period in milliseconds
    #[clap(long, default_value_t = 8)]
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    pub transfer_period_ms: u64,
    /// Batch queue pop timeout in milliseconds
    #[clap(long, default_value_t = 16)]
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    pub pop_timeout_ms: u64,
    /// Warn when the capture ring overwrites unread blocks
    #[clap(long)]
    pub report_overruns: bool,
    /// Stamp frames with uptime instead of Unix epoch milliseconds
    #[clap(long)]
    pub uptime_clock: bool,
    /// How often to log the pipeline counters, in milliseconds
    #[clap(long, default_value_t = 1000)]
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    pub stats_interval_ms: u64,
    /// Frequency of the synthetic test tone
    #[clap(long, default_value_t = 50.0)]
    pub tone_hz: f32,
    /// Peak of the synthetic test tone, as a fraction of full scale
    #[clap(long, default_value_t = 0.5)]
    pub tone_amplitude: f32,
    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[clap(long)]
    pub duration_secs: Option<u64>,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            ring_capacity: self.ring_capacity as usize,
            queue_depth: self.queue_depth as usize,
            blocks_per_batch: self.blocks_per_batch as usize,
            transfer_period: Duration::from_millis(self.transfer_period_ms),
            pop_timeout: Duration::from_millis(self.pop_timeout_ms),
            report_overruns: self.report_overruns,
            dev_id: self.dev_id,
            topic: self.topic.clone(),
            clock: if self.uptime_clock {
                FrameClock::uptime()
            } else {
                FrameClock::Unix
            },
            ..Default::default()
        }
    }
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}

fn valid_dev_id(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s, 16).map_err(|_| "Invalid hex litteral".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference() {
        let args = Args::try_parse_from(["jqmb_slurper"]).unwrap();
        let config = args.pipeline_config();
        let reference = PipelineConfig::default();
        assert_eq!(config.ring_capacity, reference.ring_capacity);
        assert_eq!(config.queue_depth, reference.queue_depth);
        assert_eq!(config.blocks_per_batch, reference.blocks_per_batch);
        assert_eq!(config.transfer_period, reference.transfer_period);
        assert_eq!(config.pop_timeout, reference.pop_timeout);
        assert_eq!(config.topic, reference.topic);
        assert!(args.udp.is_none());
        assert_eq!(args.stats_interval_ms, 1000);
    }

    #[test]
    fn test_hex_dev_id() {
        let args = Args::try_parse_from(["jqmb_slurper", "-d", "dead01", "-k", "2"]).unwrap();
        assert_eq!(args.dev_id, 0xDEAD01);
        assert_eq!(args.pipeline_config().blocks_per_batch, 2);
        assert!(Args::try_parse_from(["jqmb_slurper", "-d", "xyz"]).is_err());
        assert!(Args::try_parse_from(["jqmb_slurper", "-k", "0"]).is_err());
    }
}
