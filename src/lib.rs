pub mod config;
pub mod discovery;
pub mod endpoints;
pub mod error;
pub mod fallback;
pub mod journal;
pub mod models;
pub mod plans;
pub mod probe;
pub mod schema;
pub mod sink;

pub use config::ProbeConfig;
pub use error::{AttemptFailure, ProbeError, Result};
pub use fallback::{run_fallback, run_survey, FallbackReport, SequenceState, SurveyReport};
pub use journal::Journal;
pub use probe::{ProbeResult, Prober};
pub use sink::OutputSink;
