use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/classify";

/// Top-level configuration, every section optional in TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub classifier: ClassifierConfig,
    pub normalizer: NormalizerConfig,
    pub latency: SimulatedLatency,
}

impl PipelineConfig {
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        toml::from_str(source).context("Failed to parse pipeline config")
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&source).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.classifier.endpoint = endpoint.into();
        self
    }

    pub fn with_latency(mut self, latency: SimulatedLatency) -> Self {
        self.latency = latency;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 30,
        }
    }
}

/// Resampling filters allowed for the 28×28 downscale (nothing below bilinear)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Triangle,
    #[default]
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Buffer units added around the ink on each side
    pub padding: u32,
    /// Mean RGB below this counts as ink
    pub ink_threshold: f32,
    pub filter: ResizeFilter,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            padding: 20,
            ink_threshold: 250.0,
            filter: ResizeFilter::default(),
        }
    }
}

/// Artificial stage delays in milliseconds.
///
/// The encrypt and decrypt stages perform no cryptography; these delays are
/// all they consist of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedLatency {
    pub preprocess: u64,
    pub encrypt: u64,
    pub inference: u64,
    pub decrypt: u64,
}

impl SimulatedLatency {
    pub fn none() -> Self {
        Self {
            preprocess: 0,
            encrypt: 0,
            inference: 0,
            decrypt: 0,
        }
    }

    pub fn preprocess(&self) -> Duration {
        Duration::from_millis(self.preprocess)
    }

    pub fn encrypt(&self) -> Duration {
        Duration::from_millis(self.encrypt)
    }

    pub fn inference(&self) -> Duration {
        Duration::from_millis(self.inference)
    }

    pub fn decrypt(&self) -> Duration {
        Duration::from_millis(self.decrypt)
    }
}

impl Default for SimulatedLatency {
    fn default() -> Self {
        Self {
            preprocess: 500,
            encrypt: 1300,
            inference: 1000,
            decrypt: 600,
        }
    }
}
