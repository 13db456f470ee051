//! Static decode strategy selection by file extension.
//!
//! | extension            | chain                            |
//! |----------------------|----------------------------------|
//! | `braw`               | native -> helper -> transcoder   |
//! | photographic RAW     | raw_still -> transcoder          |
//! | anything else        | transcoder                       |
//!
//! Strategies that are not configured (no SDK binding, no helper binary)
//! are left out of the chain rather than failing at decode time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::strategies::{
    BrawSdk, HelperProcessStrategy, NativeSdkStrategy, RawStillStrategy, TranscoderStrategy,
};
use crate::strategy::DecodeStrategy;

/// Extensions handled by the RAW still converter.
pub const RAW_STILL_EXTENSIONS: &[&str] = &[
    "dng", "cr2", "cr3", "nef", "arw", "raf", "orf", "rw2", "pef", "srw",
];

/// Extension of camera-native RAW video clips.
pub const BRAW_EXTENSION: &str = "braw";

/// Binaries and limits used to build the standard strategy chains.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub helper_bin: Option<PathBuf>,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub raw_still_bin: PathBuf,
    /// Vendor SDK library directory, exported to the helper process
    pub sdk_lib_path: Option<PathBuf>,
    pub scratch_dir: PathBuf,
    pub decode_timeout: Duration,
}

/// Maps a clip path to its ordered strategy chain.
#[derive(Clone, Default)]
pub struct StrategySelector {
    chains: HashMap<String, Vec<Arc<dyn DecodeStrategy>>>,
    fallback: Vec<Arc<dyn DecodeStrategy>>,
}

impl StrategySelector {
    /// Empty selector; every path resolves to an empty chain until
    /// chains are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard chains.
    pub fn from_config(config: &SelectorConfig, sdk: Option<Arc<dyn BrawSdk>>) -> Self {
        let transcoder: Arc<dyn DecodeStrategy> = Arc::new(TranscoderStrategy::new(
            &config.ffmpeg_bin,
            &config.ffprobe_bin,
            config.decode_timeout,
        ));
        let raw_still: Arc<dyn DecodeStrategy> = Arc::new(RawStillStrategy::new(
            &config.raw_still_bin,
            config.decode_timeout,
        ));

        let mut braw: Vec<Arc<dyn DecodeStrategy>> = Vec::new();
        if let Some(sdk) = sdk {
            braw.push(Arc::new(NativeSdkStrategy::new(sdk)));
        }
        if let Some(helper) = &config.helper_bin {
            let mut strategy =
                HelperProcessStrategy::new(helper, &config.scratch_dir, config.decode_timeout);
            if let Some(lib) = &config.sdk_lib_path {
                strategy = strategy.with_library_path(lib);
            }
            braw.push(Arc::new(strategy));
        }
        braw.push(Arc::clone(&transcoder));

        let mut selector = Self::new()
            .with_chain(BRAW_EXTENSION, braw)
            .with_fallback(vec![Arc::clone(&transcoder)]);
        for ext in RAW_STILL_EXTENSIONS {
            selector = selector.with_chain(*ext, vec![Arc::clone(&raw_still), Arc::clone(&transcoder)]);
        }

        info!(
            braw_chain = ?selector.chain_names(BRAW_EXTENSION),
            "Decode strategies configured"
        );

        selector
    }

    /// Register the chain for one extension (case-insensitive).
    pub fn with_chain(
        mut self,
        extension: impl AsRef<str>,
        strategies: Vec<Arc<dyn DecodeStrategy>>,
    ) -> Self {
        self.chains
            .insert(extension.as_ref().to_ascii_lowercase(), strategies);
        self
    }

    /// Chain used for extensions without a registered chain.
    pub fn with_fallback(mut self, strategies: Vec<Arc<dyn DecodeStrategy>>) -> Self {
        self.fallback = strategies;
        self
    }

    /// Ordered strategies for `path`.
    pub fn strategies_for(&self, path: &Path) -> &[Arc<dyn DecodeStrategy>] {
        let ext = extension_of(path);
        self.chains.get(&ext).unwrap_or(&self.fallback)
    }

    /// Strategy names of the chain for `extension`, for logging.
    pub fn chain_names(&self, extension: &str) -> Vec<&'static str> {
        self.chains
            .get(&extension.to_ascii_lowercase())
            .unwrap_or(&self.fallback)
            .iter()
            .map(|s| s.name())
            .collect()
    }
}

/// Lowercase extension of `path`, empty when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}
