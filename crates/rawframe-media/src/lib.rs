#![deny(unreachable_patterns)]
//! Decode strategies and frame post-processing.
//!
//! This crate provides:
//! - The `DecodeStrategy` capability interface and ordered fallback
//! - Native SDK, helper subprocess, generic transcoder (FFmpeg) and
//!   RAW still (dcraw) strategies
//! - Static per-extension strategy selection
//! - Pixel normalization, scaling and JPEG encoding
//! - PPM parsing for decoder outputs

pub mod command;
pub mod error;
pub mod frame;
pub mod fs_utils;
pub mod ppm;
pub mod probe;
pub mod render;
pub mod selector;
pub mod strategies;
pub mod strategy;

pub use command::{
    capture_output, capture_output_with_env, check_binary, FfmpegCommand, ProcessOutput,
};
pub use error::{MediaError, MediaResult};
pub use frame::{DecodedFrame, PixelData};
pub use probe::probe_video;
pub use render::{render_frame, RenderedFrame};
pub use selector::{
    extension_of, SelectorConfig, StrategySelector, BRAW_EXTENSION, RAW_STILL_EXTENSIONS,
};
pub use strategies::{
    BrawSdk, HelperProcessStrategy, NativeSdkStrategy, RawStillStrategy, SdkClipInfo, SdkFrame,
    TranscoderStrategy,
};
pub use strategy::{try_in_order, ChainExhausted, ChainSuccess, DecodeStrategy, StrategyAttempt};
