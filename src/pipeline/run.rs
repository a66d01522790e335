use serde::Serialize;

use super::logbook::{LogEntry, Severity};
use super::stage::{PipelineStage, StageId, StageStatus};
use crate::models::{NormalizedVector, Prediction};

/// Everything one attempt through the pipeline has produced so far
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    id: u64,
    stages: [PipelineStage; 5],
    log: Vec<LogEntry>,
    /// The "ciphertext": the plain vector, held until it is sent
    payload: Option<NormalizedVector>,
    prediction: Option<Prediction>,
}

impl PipelineRun {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            stages: StageId::ALL.map(PipelineStage::new),
            log: Vec::new(),
            payload: None,
            prediction: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn stage(&self, id: StageId) -> &PipelineStage {
        &self.stages[id.index()]
    }

    pub fn status(&self, id: StageId) -> StageStatus {
        self.stage(id).status
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn payload(&self) -> Option<&NormalizedVector> {
        self.payload.as_ref()
    }

    pub fn prediction(&self) -> Option<Prediction> {
        self.prediction
    }

    /// No stage has moved and nothing was produced. Warnings from an empty
    /// drawing may already be in the log.
    pub fn is_initial(&self) -> bool {
        self.stages.iter().all(|s| s.is(StageStatus::Pending))
            && self.payload.is_none()
            && self.prediction.is_none()
    }

    pub fn failed_stage(&self) -> Option<StageId> {
        self.stages
            .iter()
            .find(|s| s.is(StageStatus::Error))
            .map(|s| s.id)
    }

    pub fn is_finished(&self) -> bool {
        self.status(StageId::Decrypt) == StageStatus::Completed
    }

    pub(crate) fn stage_mut(&mut self, id: StageId) -> &mut PipelineStage {
        &mut self.stages[id.index()]
    }

    pub(crate) fn set_payload(&mut self, payload: NormalizedVector) {
        self.payload = Some(payload);
    }

    pub(crate) fn set_prediction(&mut self, prediction: Prediction) {
        self.prediction = Some(prediction);
    }

    /// Append to the run log and mirror the line to the `log` facade
    pub(crate) fn push_log(&mut self, message: impl Into<String>, severity: Severity) {
        let entry = LogEntry::new(message, severity);
        log::log!(severity.level(), "run {}: {}", self.id, entry.message);
        self.log.push(entry);
    }
}
