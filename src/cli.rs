use clap::{Arg, ArgAction, ArgMatches, Command};
use anyhow::{anyhow, Result};

use crate::analyzer::{AnalyzerConfig, TargetDomain};

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub input_file: String,
    pub output_file: Option<String>,
    pub target: TargetDomain,
    pub output_format: OutputFormat,
    pub round_trip: bool,
    pub keep_going: bool,
    pub verbose_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

pub fn create_cli() -> Command {
    Command::new("RustLaplace")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Symbolic Laplace transforms of circuit voltage and current expressions")
        .arg(
            Arg::new("input")
                .help("Worksheet file with one expression per line")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file for transform results"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("csv")
                .value_parser(["csv", "json"])
                .help("Output format"),
        )
        .arg(
            Arg::new("to")
                .long("to")
                .value_name("DOMAIN")
                .default_value("auto")
                .value_parser(["auto", "frequency", "time"])
                .help("Target domain; auto flips each expression to the other side"),
        )
        .arg(
            Arg::new("round-trip")
                .long("round-trip")
                .action(ArgAction::SetTrue)
                .help("Transform every result back and check it reproduces the source"),
        )
        .arg(
            Arg::new("keep-going")
                .long("keep-going")
                .action(ArgAction::SetTrue)
                .help("Record failed transforms instead of stopping at the first one"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .ok_or_else(|| anyhow!("Input file is required"))?
            .clone();

        let output_file = matches.get_one::<String>("output").cloned();

        let verbose_level = matches.get_count("verbose");

        let output_format = match matches.get_one::<String>("format").map(String::as_str) {
            Some("csv") | None => OutputFormat::Csv,
            Some("json") => OutputFormat::Json,
            Some(other) => return Err(anyhow!("Invalid output format: {}", other)),
        };

        let target = match matches.get_one::<String>("to") {
            Some(value) => value.parse()?,
            None => TargetDomain::Auto,
        };

        Ok(CliArgs {
            input_file,
            output_file,
            target,
            output_format,
            round_trip: matches.get_flag("round-trip"),
            keep_going: matches.get_flag("keep-going"),
            verbose_level,
        })
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            target: self.target,
            verify_round_trip: self.round_trip,
            stop_on_error: !self.keep_going,
            ..AnalyzerConfig::default()
        }
    }

    /// Default log filter for the `-v` count
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose_level {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
