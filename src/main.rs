use colored::*;
use log::{error, info};
use std::path::Path;

use RustLaplace::analyzer::Analyzer;
use RustLaplace::cli::{create_cli, CliArgs};

fn main() {
    let matches = create_cli().get_matches();

    let args = match CliArgs::from_matches(&matches) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            std::process::exit(2);
        }
    };

    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    if let Err(e) = run_application(args) {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn run_application(args: CliArgs) -> anyhow::Result<()> {
    info!("{}", "Starting RustLaplace".green().bold());
    info!("Input file: {}", args.input_file.bright_blue());

    if !Path::new(&args.input_file).exists() {
        return Err(anyhow::anyhow!("Input file '{}' not found", args.input_file));
    }

    let mut analyzer = Analyzer::with_config(args.analyzer_config());
    analyzer.load_worksheet(&args.input_file)?;
    if args.verbose_level > 0 {
        if let Some(circuit) = analyzer.circuit() {
            circuit.print_summary();
        }
    }

    analyzer.run()?;

    if let Some(output_file) = &args.output_file {
        analyzer.export_results(output_file, args.output_format)?;
        info!("Results exported to: {}", output_file.bright_green());
    } else {
        analyzer.print_summary();
    }

    match analyzer.get_results() {
        Some(report) if report.failed() > 0 => {
            println!("{}", format!("{} expression(s) could not be transformed", report.failed()).yellow());
        }
        _ => info!("{}", "All expressions transformed".green().bold()),
    }
    Ok(())
}
