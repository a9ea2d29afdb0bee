use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use anyhow::{anyhow, Result};
use log::{info, warn, debug};
use serde::{Deserialize, Serialize};

use crate::circuit::Circuit;
use crate::cli::OutputFormat;
use crate::domain::Domain;
use crate::error::TransformResult;
use crate::expression::Expression;
use crate::parser::{Worksheet, WorksheetParser};

/// Which side of the transform every expression is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetDomain {
    /// Time-domain trees go to frequency, frequency-domain trees to time
    Auto,
    Frequency,
    Time,
}

impl TargetDomain {
    /// Domain a tree classified as `domain` is transformed into
    pub fn resolve(&self, domain: Domain) -> Domain {
        match self {
            TargetDomain::Auto => domain.opposite(),
            TargetDomain::Frequency => Domain::Frequency,
            TargetDomain::Time => Domain::Time,
        }
    }
}

impl FromStr for TargetDomain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(TargetDomain::Auto),
            "frequency" | "freq" | "s" => Ok(TargetDomain::Frequency),
            "time" | "t" => Ok(TargetDomain::Time),
            _ => Err(anyhow!("Invalid target domain: {}", s)),
        }
    }
}

impl fmt::Display for TargetDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetDomain::Auto => write!(f, "auto"),
            TargetDomain::Frequency => write!(f, "frequency"),
            TargetDomain::Time => write!(f, "time"),
        }
    }
}

/// Outcome of classifying and transforming one expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRecord {
    /// Worksheet line the expression came from, e.g. `line 4`
    pub origin: String,
    pub source: String,
    pub domain: Option<Domain>,
    pub target: Option<Domain>,
    pub result: Option<String>,
    pub expression: Option<Expression>,
    pub error: Option<String>,
    pub round_trip: Option<bool>,
}

impl TransformRecord {
    fn new(origin: String, source: String) -> Self {
        TransformRecord {
            origin,
            source,
            domain: None,
            target: None,
            result: None,
            expression: None,
            error: None,
            round_trip: None,
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Results of one analyzer run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub title: String,
    pub target: TargetDomain,
    pub records: Vec<TransformRecord>,
    pub total_time: f64,
}

impl AnalysisReport {
    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| r.success()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.succeeded()
    }

    pub fn round_trip_failures(&self) -> usize {
        self.records.iter().filter(|r| r.round_trip == Some(false)).count()
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub target: TargetDomain,
    /// Transform every result back and compare with the source tree
    pub verify_round_trip: bool,
    /// Abort the run on the first failed transform
    pub stop_on_error: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            target: TargetDomain::Auto,
            verify_round_trip: false,
            stop_on_error: true,
        }
    }
}

/// Drives worksheet loading, transformation and reporting
pub struct Analyzer {
    worksheet: Option<Worksheet>,
    report: Option<AnalysisReport>,
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::with_config(AnalyzerConfig::default())
    }

    pub fn with_config(config: AnalyzerConfig) -> Self {
        Analyzer {
            worksheet: None,
            report: None,
            config,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Load a worksheet from file
    pub fn load_worksheet(&mut self, filename: &str) -> Result<()> {
        info!("Loading worksheet from: {}", filename);

        let worksheet = WorksheetParser::new().parse_file(filename)?;
        self.load_parsed_worksheet(worksheet)
    }

    pub fn load_worksheet_from_str(&mut self, content: &str) -> Result<()> {
        let worksheet = WorksheetParser::new().parse_worksheet(content)?;
        self.load_parsed_worksheet(worksheet)
    }

    fn load_parsed_worksheet(&mut self, worksheet: Worksheet) -> Result<()> {
        worksheet.circuit.validate()?;

        info!(
            "Loaded worksheet '{}': {} expressions over {} pins",
            worksheet.title,
            worksheet.entries.len(),
            worksheet.circuit.pins.len()
        );

        self.worksheet = Some(worksheet);
        self.report = None;
        Ok(())
    }

    pub fn circuit(&self) -> Option<&Circuit> {
        self.worksheet.as_ref().map(|w| &w.circuit)
    }

    /// Classify and transform every expression of the loaded worksheet
    pub fn run(&mut self) -> Result<()> {
        let worksheet = self.worksheet.as_ref()
            .ok_or_else(|| anyhow!("No worksheet loaded"))?;
        info!("Transforming worksheet '{}' (target: {})", worksheet.title, self.config.target);

        let start_time = Instant::now();
        let circuit = &worksheet.circuit;

        let mut records = Vec::with_capacity(worksheet.entries.len());
        for entry in &worksheet.entries {
            let record = self.analyze(format!("line {}", entry.line), &entry.expression, circuit);

            if let Some(error) = &record.error {
                warn!("{}: {}", record.origin, error);
                if self.config.stop_on_error {
                    return Err(anyhow!("{}: {}", record.origin, error));
                }
            }
            records.push(record);
        }

        let report = AnalysisReport {
            title: worksheet.title.clone(),
            target: self.config.target,
            records,
            total_time: start_time.elapsed().as_secs_f64(),
        };
        info!(
            "Transformed {} of {} expressions in {:.3}ms",
            report.succeeded(),
            report.records.len(),
            report.total_time * 1000.0
        );

        self.report = Some(report);
        Ok(())
    }

    fn analyze(&self, origin: String, expression: &Expression, circuit: &Circuit) -> TransformRecord {
        let mut record = TransformRecord::new(origin, expression.render(circuit).to_string());

        let domain = match expression.domain() {
            Ok(domain) => domain,
            Err(e) => {
                record.error = Some(e.to_string());
                return record;
            }
        };
        let target = self.config.target.resolve(domain);
        debug!("{}: {} ({} -> {})", record.origin, record.source, domain, target);
        record.domain = Some(domain);
        record.target = Some(target);

        match transform(expression, target) {
            Ok(result) => {
                if self.config.verify_round_trip && !domain.is_invariant() {
                    let back = transform(&result, domain);
                    let matches = matches!(&back, Ok(back) if back == expression);
                    if !matches {
                        debug!("{}: round trip did not reproduce the source", record.origin);
                    }
                    record.round_trip = Some(matches);
                }
                record.result = Some(result.render(circuit).to_string());
                record.expression = Some(result);
            }
            Err(e) => record.error = Some(e.to_string()),
        }
        record
    }

    pub fn get_results(&self) -> Option<&AnalysisReport> {
        self.report.as_ref()
    }

    /// Export the report to file
    pub fn export_results(&self, filename: &str, format: OutputFormat) -> Result<()> {
        let report = self.report.as_ref()
            .ok_or_else(|| anyhow!("No analysis results available"))?;

        match format {
            OutputFormat::Csv => self.export_csv(report, filename),
            OutputFormat::Json => self.export_json(report, filename),
        }
    }

    fn export_csv(&self, report: &AnalysisReport, filename: &str) -> Result<()> {
        use std::fs::File;
        use csv::Writer;

        let file = File::create(filename)?;
        let mut writer = Writer::from_writer(file);

        writer.write_record(["origin", "source", "domain", "target", "result", "round_trip", "error"])?;
        for record in &report.records {
            writer.write_record([
                record.origin.clone(),
                record.source.clone(),
                optional(record.domain),
                optional(record.target),
                record.result.clone().unwrap_or_default(),
                optional(record.round_trip),
                record.error.clone().unwrap_or_default(),
            ])?;
        }

        writer.flush()?;
        info!("Results exported to CSV: {}", filename);
        Ok(())
    }

    fn export_json(&self, report: &AnalysisReport, filename: &str) -> Result<()> {
        use std::fs::File;

        let file = File::create(filename)?;
        serde_json::to_writer_pretty(file, report)?;

        info!("Results exported to JSON: {}", filename);
        Ok(())
    }

    pub fn print_summary(&self) {
        if let Some(report) = &self.report {
            println!("\n=== Transform Summary ===");
            println!("Worksheet: {}", report.title);
            println!("Target: {}", report.target);
            println!("Total time: {:.3}ms", report.total_time * 1000.0);
            println!("Succeeded: {}/{}", report.succeeded(), report.records.len());

            for record in &report.records {
                match (&record.result, &record.error) {
                    (Some(result), _) => {
                        println!("  [{}] {}  =>  {}", record.origin, record.source, result);
                    }
                    (None, Some(error)) => {
                        println!("  [{}] {}  !!  {}", record.origin, record.source, error);
                    }
                    (None, None) => {}
                }
            }

            if self.config.verify_round_trip {
                println!("Round-trip mismatches: {}", report.round_trip_failures());
            }
        } else {
            println!("No analysis results available");
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn transform(expression: &Expression, target: Domain) -> TransformResult<Expression> {
    match target {
        Domain::Frequency => expression.to_frequency(),
        Domain::Time => expression.to_time(),
        Domain::Invariant => Ok(expression.clone()),
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
