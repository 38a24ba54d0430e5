//! External inference collaborators
//!
//! Face/emotion inference and action-unit extraction live outside this
//! service. They sit behind [`FrameAnalyzer`] and [`ActionUnitExtractor`]
//! and are always invoked before any session lock is taken. A failing
//! collaborator means "no score set for this frame", never a failed ingest.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use emotrack_common::config::ServiceConfig;
use emotrack_common::{ActionUnitSet, EmotionScoreSet};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Per-frame collaborator failure
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("No face detected")]
    NoFace,

    /// Not configured, not installed, or not reachable
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator failed: {0}")]
    Failed(String),
}

/// Image -> emotion probability scores
#[async_trait]
pub trait FrameAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(&self, image: &[u8]) -> Result<EmotionScoreSet, CollaboratorError>;
}

/// Image -> action-unit intensities
#[async_trait]
pub trait ActionUnitExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, image: &[u8]) -> Result<ActionUnitSet, CollaboratorError>;
}

/// Decode a `data:image/<type>;base64,<payload>` URI
pub fn decode_image_data(data: &str) -> emotrack_common::Result<Vec<u8>> {
    let invalid = |reason: &str| {
        emotrack_common::Error::InvalidInput(format!("Invalid image data format: {}", reason))
    };

    if !data.starts_with("data:image/") {
        return Err(invalid("expected data:image/ URI"));
    }
    let (header, payload) = data
        .split_once(',')
        .ok_or_else(|| invalid("missing payload"))?;
    if !header.ends_with(";base64") {
        return Err(invalid("expected base64 encoding"));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| invalid(&e.to_string()))?;
    if bytes.is_empty() {
        return Err(invalid("empty image"));
    }
    Ok(bytes)
}

/// Posts raw image bytes to an inference endpoint
///
/// The endpoint answers with a JSON object of label -> score, or 422 when
/// no face was found.
pub struct HttpFrameAnalyzer {
    client: reqwest::Client,
    url: String,
}

impl HttpFrameAnalyzer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> emotrack_common::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| emotrack_common::Error::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FrameAnalyzer for HttpFrameAnalyzer {
    fn name(&self) -> &'static str {
        "http-analyzer"
    }

    async fn analyze(&self, image: &[u8]) -> Result<EmotionScoreSet, CollaboratorError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Err(CollaboratorError::NoFace);
        }
        if !status.is_success() {
            return Err(CollaboratorError::Failed(format!("HTTP {}", status)));
        }

        let raw: BTreeMap<String, f64> = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Failed(format!("Invalid response body: {}", e)))?;
        EmotionScoreSet::from_raw(raw).map_err(|e| CollaboratorError::Failed(e.to_string()))
    }
}

/// Pipes the image to an external extraction program
///
/// The program reads the image on stdin and prints a JSON object of
/// action-unit code -> intensity on stdout.
pub struct CommandActionUnitExtractor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandActionUnitExtractor {
    /// `command[0]` is the program, the rest its arguments
    pub fn from_command(command: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }
}

#[async_trait]
impl ActionUnitExtractor for CommandActionUnitExtractor {
    fn name(&self) -> &'static str {
        "command-extractor"
    }

    async fn extract(&self, image: &[u8]) -> Result<ActionUnitSet, CollaboratorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CollaboratorError::Unavailable(format!("{} not found", self.program))
                }
                _ => CollaboratorError::Failed(format!("spawn {}: {}", self.program, e)),
            })?;

        // Feed stdin concurrently so a chatty child cannot deadlock on stdout
        if let Some(mut stdin) = child.stdin.take() {
            let image = image.to_vec();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&image).await {
                    debug!("Extractor closed stdin early: {}", e);
                }
            });
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CollaboratorError::Failed(format!("{} timed out", self.program)))?
            .map_err(|e| CollaboratorError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollaboratorError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let raw: BTreeMap<String, f64> = serde_json::from_slice(&output.stdout)
            .map_err(|e| CollaboratorError::Failed(format!("Invalid extractor output: {}", e)))?;
        ActionUnitSet::from_raw(raw).map_err(|e| CollaboratorError::Failed(e.to_string()))
    }
}

/// Whatever the collaborators produced for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutputs {
    pub scores: Option<EmotionScoreSet>,
    pub action_units: Option<ActionUnitSet>,
}

/// The configured collaborator set
#[derive(Clone, Default)]
pub struct Collaborators {
    analyzer: Option<Arc<dyn FrameAnalyzer>>,
    extractor: Option<Arc<dyn ActionUnitExtractor>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn FrameAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ActionUnitExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Build the adapters named in the service configuration
    pub fn from_config(config: &ServiceConfig) -> emotrack_common::Result<Self> {
        let mut collaborators = Self::new();

        if let Some(url) = &config.analyzer_url {
            info!("Frame analyzer: {}", url);
            collaborators = collaborators.with_analyzer(Arc::new(HttpFrameAnalyzer::new(
                url.clone(),
                config.collaborator_timeout,
            )?));
        } else {
            warn!("No frame analyzer configured; /process will not produce probability scores");
        }

        if let Some(extractor) = config
            .action_unit_command
            .as_deref()
            .and_then(|command| {
                CommandActionUnitExtractor::from_command(command, config.collaborator_timeout)
            })
        {
            info!("Action-unit extractor: {}", extractor.program);
            collaborators = collaborators.with_extractor(Arc::new(extractor));
        }

        Ok(collaborators)
    }

    pub fn has_analyzer(&self) -> bool {
        self.analyzer.is_some()
    }

    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    /// Run both collaborators concurrently; failures become `None`
    pub async fn analyze_frame(&self, image: &[u8]) -> FrameOutputs {
        let (scores, action_units) = tokio::join!(
            run_analyzer(self.analyzer.as_deref(), image),
            run_extractor(self.extractor.as_deref(), image),
        );
        FrameOutputs {
            scores,
            action_units,
        }
    }
}

async fn run_analyzer(
    analyzer: Option<&dyn FrameAnalyzer>,
    image: &[u8],
) -> Option<EmotionScoreSet> {
    let analyzer = analyzer?;
    match analyzer.analyze(image).await {
        Ok(scores) => Some(scores),
        Err(CollaboratorError::NoFace) => {
            debug!(collaborator = analyzer.name(), "No face detected in frame");
            None
        }
        Err(e) => {
            warn!(collaborator = analyzer.name(), error = %e, "Frame analysis failed");
            None
        }
    }
}

async fn run_extractor(
    extractor: Option<&dyn ActionUnitExtractor>,
    image: &[u8],
) -> Option<ActionUnitSet> {
    let extractor = extractor?;
    match extractor.extract(image).await {
        Ok(action_units) => Some(action_units),
        Err(e) => {
            warn!(collaborator = extractor.name(), error = %e, "Action-unit extraction failed");
            None
        }
    }
}
