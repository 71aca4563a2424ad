use log::error;
use std::sync::Arc;

use crate::cli::ScanArgs;
use crate::config::ScanConfig;
use crate::notifications;
use crate::policy::default_engines;
use crate::runtime::output::EXIT_FAILURE;
use crate::runtime::{Executor, OutputFormat, ScanOptions};

/// Scan options for the CLI arguments.
pub fn build_options(args: &ScanArgs) -> ScanOptions {
    let mut options = ScanOptions::new(args.iac_type.clone())
        .with_iac_version(args.iac_version.clone())
        .with_cloud_types(args.cloud_types.clone())
        .with_dirs(args.iac_dirs.clone())
        .with_scan_rules(args.scan_rules.clone())
        .with_skip_rules(args.skip_rules.clone())
        .with_categories(args.categories.clone())
        .with_severity(args.severity.clone())
        .with_values_files(args.values_files.clone())
        .with_non_recursive(args.non_recursive)
        .with_output_mode(args.output_mode())
        .with_show_passed(args.show_passed);
    if let Some(file) = &args.iac_file {
        options = options.with_file(file.clone());
    }
    options
}

/// Run a scan, print its output and return the process exit status.
pub fn handle_scan(args: ScanArgs, config: ScanConfig) -> crate::Result<i32> {
    let notifiers = notifications::from_config(&config)?;
    let format = OutputFormat::from(args.output);
    let executor = Executor::new(build_options(&args), Arc::new(config), default_engines(), notifiers);

    match executor.execute() {
        Ok(output) => {
            println!("{}", output.render(format)?);
            Ok(output.exit_code())
        }
        Err(e) => match e.output {
            // the results are complete; only a later stage failed
            Some(output) => {
                println!("{}", output.render(format)?);
                error!("{}", e.error);
                Ok(EXIT_FAILURE)
            }
            None => Err(e.error),
        },
    }
}
