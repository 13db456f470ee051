//! Decode strategy capability interface and ordered fallback.

use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use rawframe_models::ProbedMetadata;

use crate::error::{MediaError, MediaResult};
use crate::frame::DecodedFrame;

/// A way of turning a clip into metadata and decoded frames.
#[async_trait]
pub trait DecodeStrategy: Send + Sync {
    /// Stable short name, used in logs and metadata (`native`, `helper`, ...).
    fn name(&self) -> &'static str;

    /// Whether two reads of the same clip may run at the same time.
    ///
    /// Strategies that return `false` are serialized per clip by the caller.
    fn supports_concurrent_reads(&self) -> bool {
        true
    }

    /// Read clip metadata.
    async fn probe(&self, path: &Path) -> MediaResult<ProbedMetadata>;

    /// Decode the frame at `frame_index`.
    ///
    /// `fps` is the clip's canonical frame rate, for strategies that seek by
    /// time rather than index.
    async fn decode_frame(&self, path: &Path, frame_index: u64, fps: f64)
        -> MediaResult<DecodedFrame>;
}

/// Record of one failed strategy attempt.
#[derive(Debug, Clone)]
pub struct StrategyAttempt {
    pub strategy: &'static str,
    pub error: String,
}

/// The first strategy that succeeded, plus the ones that failed before it.
#[derive(Debug)]
pub struct ChainSuccess<T> {
    pub value: T,
    pub strategy: &'static str,
    pub failed: Vec<StrategyAttempt>,
}

/// Every strategy in the chain failed.
#[derive(Debug)]
pub struct ChainExhausted {
    pub attempts: Vec<StrategyAttempt>,
    pub last_error: Option<MediaError>,
}

impl ChainExhausted {
    /// Human-readable summary of the last failure.
    pub fn last_message(&self) -> String {
        match &self.last_error {
            Some(e) => e.to_string(),
            None => "no decode strategy available".to_string(),
        }
    }
}

/// Run `op` against each strategy in order until one succeeds.
///
/// Failures are logged and collected; the chain never retries a strategy.
pub async fn try_in_order<T, F, Fut>(
    strategies: &[Arc<dyn DecodeStrategy>],
    mut op: F,
) -> Result<ChainSuccess<T>, ChainExhausted>
where
    F: FnMut(Arc<dyn DecodeStrategy>) -> Fut,
    Fut: Future<Output = MediaResult<T>>,
{
    let mut failed = Vec::new();
    let mut last_error = None;

    for strategy in strategies {
        let name = strategy.name();
        match op(Arc::clone(strategy)).await {
            Ok(value) => {
                debug!(strategy = name, fallbacks = failed.len(), "Strategy succeeded");
                return Ok(ChainSuccess {
                    value,
                    strategy: name,
                    failed,
                });
            }
            Err(e) => {
                warn!(strategy = name, error = %e, "Strategy failed, trying next");
                failed.push(StrategyAttempt {
                    strategy: name,
                    error: e.to_string(),
                });
                last_error = Some(e);
            }
        }
    }

    Err(ChainExhausted {
        attempts: failed,
        last_error,
    })
}
