//! Error types for sfera-dsp

use sfera_core::OutputPatch;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Not enough speakers for {dimension} panning: {required} required, {found} active")]
    NotEnoughSpeakers {
        dimension: &'static str,
        required: usize,
        found: usize,
    },

    #[error("Output patch {0} is used by more than one speaker")]
    DuplicateOutputPatch(OutputPatch),

    #[error("Degenerate speaker layout: {0}")]
    DegenerateLayout(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid HRIR set: {0}")]
    InvalidHrir(String),

    #[error(transparent)]
    Core(#[from] sfera_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
