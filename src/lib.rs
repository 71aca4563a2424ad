//! # Syncable IaC Scan
//!
//! Loads Infrastructure as Code from several formats into one normalized
//! resource model and evaluates security policies against it.
//!
//! ## Features
//!
//! - **Format loaders**: Kubernetes manifests, Helm charts, Kustomize overlays,
//!   CloudFormation templates, Dockerfiles and Terraform plan JSON
//! - **Inline directives**: skip rules and severity overrides from annotations,
//!   metadata and comments
//! - **Policy filtering**: rule allow and deny lists, categories and a severity floor
//! - **Admission control**: a Kubernetes validating admission webhook
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use syncable_iac_scan::config::ScanConfig;
//! use syncable_iac_scan::policy::default_engines;
//! use syncable_iac_scan::runtime::{Executor, ScanOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ScanOptions::new("k8s").with_dirs(vec![PathBuf::from("./deploy")]);
//! let output = Executor::new(options, Arc::new(ScanConfig::default()), default_engines(), vec![]).execute()?;
//! println!("{} violation(s)", output.store.violations.len());
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod error;
pub mod handlers;
pub mod iac;
pub mod notifications;
pub mod policy;
pub mod runtime;
pub mod server;

// Re-export commonly used types and functions
pub use error::{Result, ScanError};
pub use iac::{AllResourceConfigs, IacLoader, IacProvider, ResourceConfig};
pub use runtime::{Executor, ScanOptions, ScanOutput};

use cli::Commands;
use config::ScanConfig;

/// The current version of the CLI tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a parsed command and return the process exit status.
pub fn run_command(command: Commands, config: ScanConfig) -> Result<i32> {
    match command {
        Commands::Scan(args) => handlers::handle_scan(args, config),
        Commands::Server { port, host } => handlers::handle_server(port, host, config).map(|_| 0),
    }
}
