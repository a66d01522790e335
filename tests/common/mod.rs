#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from fhedigit for tests
pub use fhedigit::{
    Classification, ClassifierClient, ClassifierError, DecryptOutcome, LogEntry, Normalized, NormalizedVector,
    Orchestrator, PipelineConfig, PipelineError, PipelineHandle, PipelineRun, PixelBuffer,
    Prediction, Severity, StageId, StageStatus, StartOutcome, TransmitOutcome,
};
