//! CLI argument definitions.

use super::validators::{parse_bitrate, parse_concurrency};
use crate::config::{Config, InferenceDevice, OutputFormat};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Separate audio into stems with Demucs and publish them to object storage.
#[derive(Debug, Parser)]
#[command(name = "stemsplit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (default: platform config directory).
    #[arg(short, long, global = true, env = "STEMSPLIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v: debug, -vv: trace+ORT info, -vvv: trace+ORT debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process one job payload and print the JSON response.
    Run(RunArgs),
    /// Process newline-delimited payloads from stdin, one response line each.
    Worker(WorkerArgs),
    /// Manage models.
    Models {
        /// Models action to perform.
        #[command(subcommand)]
        action: ModelsAction,
    },
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}

/// Models subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ModelsAction {
    /// List known models and whether their files are present.
    List,
    /// Verify model definitions and that their files exist.
    Check,
}

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Payload file, or `-` for stdin.
    #[arg(short, long, default_value = "-")]
    pub payload: PathBuf,

    /// Job overrides.
    #[command(flatten)]
    pub overrides: JobOverrides,
}

/// Arguments for the worker command.
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Load the default model before reading the first payload.
    #[arg(long)]
    pub preload: bool,

    /// Job overrides.
    #[command(flatten)]
    pub overrides: JobOverrides,
}

/// Settings that override the configuration file for this process.
#[derive(Debug, Args)]
pub struct JobOverrides {
    /// Output container (mp3 or wav).
    #[arg(short, long, env = "STEMSPLIT_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Mp3 bitrate in kbps (96-320).
    #[arg(short, long, value_parser = parse_bitrate, env = "STEMSPLIT_BITRATE")]
    pub bitrate: Option<u32>,

    /// Maximum concurrent uploads per job.
    #[arg(long, value_parser = parse_concurrency, env = "STEMSPLIT_UPLOAD_CONCURRENCY")]
    pub upload_concurrency: Option<usize>,

    /// Require CUDA inference.
    #[arg(long, conflicts_with = "cpu")]
    pub gpu: bool,

    /// Force CPU inference.
    #[arg(long, conflicts_with = "gpu")]
    pub cpu: bool,
}

impl JobOverrides {
    /// Apply the overrides on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(format) = self.format {
            config.encoder.format = format;
        }
        if let Some(bitrate) = self.bitrate {
            config.encoder.bitrate_kbps = bitrate;
        }
        if let Some(concurrency) = self.upload_concurrency {
            config.pipeline.upload_concurrency = concurrency;
        }
        if self.gpu {
            config.inference.device = InferenceDevice::Gpu;
        } else if self.cpu {
            config.inference.device = InferenceDevice::Cpu;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run_defaults_to_stdin() {
        let cli = Cli::try_parse_from(["stemsplit", "run"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.payload, PathBuf::from("-"));
        assert!(!cli.quiet);
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["stemsplit", "worker", "-vv", "--config", "/tmp/c.toml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_cli_parse_config_subcommand() {
        let cli = Cli::try_parse_from(["stemsplit", "config", "show"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_gpu_and_cpu_conflict() {
        let cli = Cli::try_parse_from(["stemsplit", "run", "--gpu", "--cpu"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_bitrate_out_of_range_rejected() {
        let cli = Cli::try_parse_from(["stemsplit", "run", "--bitrate", "64"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::try_parse_from([
            "stemsplit",
            "run",
            "--format",
            "wav",
            "--upload-concurrency",
            "2",
            "--cpu",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };

        let mut config = Config::default();
        args.overrides.apply(&mut config);
        assert_eq!(config.encoder.format, OutputFormat::Wav);
        assert_eq!(config.encoder.bitrate_kbps, 320);
        assert_eq!(config.pipeline.upload_concurrency, 2);
        assert_eq!(config.inference.device, InferenceDevice::Cpu);
    }
}
