use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::runtime::{OutputFormat, OutputMode};

#[derive(Parser)]
#[command(name = "sync-scan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scan Infrastructure as Code for policy violations")]
#[command(
    long_about = "Loads Kubernetes manifests, Helm charts, Kustomize overlays, CloudFormation templates, Dockerfiles and Terraform plans into one resource model and checks them against security policies."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan IaC files or directories
    Scan(ScanArgs),

    /// Run the HTTP scan server
    Server {
        /// Port to listen on
        #[arg(short, long, default_value_t = 9010)]
        port: u16,

        /// Host address to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct ScanArgs {
    /// IaC type (k8s, helm, kustomize, cft, docker, tfplan)
    #[arg(short, long, default_value = "k8s")]
    pub iac_type: String,

    /// IaC version; defaults to the latest supported for the type
    #[arg(long, default_value_t)]
    pub iac_version: String,

    /// Cloud provider (aws, azure, gcp, k8s, docker, github)
    #[arg(short = 't', long = "cloud-type", value_delimiter = ',')]
    pub cloud_types: Vec<String>,

    /// Path to a single IaC file
    #[arg(short = 'f', long, value_name = "FILE")]
    pub iac_file: Option<PathBuf>,

    /// Directory to scan; repeat for several roots
    #[arg(short = 'd', long = "iac-dir", value_name = "DIR")]
    pub iac_dirs: Vec<PathBuf>,

    /// Only evaluate these rule ids
    #[arg(short = 'r', long, value_delimiter = ',')]
    pub scan_rules: Vec<String>,

    /// Never evaluate these rule ids
    #[arg(long, value_delimiter = ',')]
    pub skip_rules: Vec<String>,

    /// Only report rules of these categories
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Minimum severity to report (low, medium, high)
    #[arg(long, default_value_t)]
    pub severity: String,

    /// Helm values files, applied in order
    #[arg(long, value_delimiter = ',', value_name = "FILE")]
    pub values_files: Vec<PathBuf>,

    /// Print the normalized resources without evaluating policies
    #[arg(long, conflicts_with = "config_with_error")]
    pub config_only: bool,

    /// Print the normalized resources and the load errors
    #[arg(long)]
    pub config_with_error: bool,

    /// Include passed rules in the output
    #[arg(long)]
    pub show_passed: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    pub output: OutputArg,

    /// Only scan the top level of each directory
    #[arg(long)]
    pub non_recursive: bool,
}

impl ScanArgs {
    pub fn output_mode(&self) -> OutputMode {
        if self.config_only {
            OutputMode::ConfigOnly
        } else if self.config_with_error {
            OutputMode::ConfigWithErrors
        } else {
            OutputMode::Violations
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputArg {
    Human,
    Json,
    Yaml,
}

impl From<OutputArg> for OutputFormat {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Human => OutputFormat::Human,
            OutputArg::Json => OutputFormat::Json,
            OutputArg::Yaml => OutputFormat::Yaml,
        }
    }
}

impl Cli {
    /// Initialize logging based on verbosity level
    pub fn init_logging(&self) {
        if self.quiet {
            return;
        }

        let level = match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };

        env_logger::Builder::from_default_env()
            .filter_level(level)
            .init();
    }
}
