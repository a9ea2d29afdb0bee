pub mod analyzer;
pub mod circuit;
pub mod cli;
pub mod domain;
pub mod error;
pub mod expression;
pub mod laplace;
pub mod parser;

// Re-export commonly used types
pub use analyzer::{AnalysisReport, Analyzer, AnalyzerConfig, TargetDomain, TransformRecord};
pub use circuit::{Circuit, Component, ComponentKind, Current, Element, Pin, PinId, Voltage};
pub use domain::Domain;
pub use error::{ExpressionError, TransformResult};
pub use expression::{Constant, Expression, Variable};
pub use parser::{ExpressionParser, WorksheetParser};

// Error types
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
