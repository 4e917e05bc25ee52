//! Centralized error type for the sfera umbrella crate.
//!
//! Wraps the subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] sfera_core::Error),

    #[error("DSP: {0}")]
    Dsp(#[from] sfera_dsp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
