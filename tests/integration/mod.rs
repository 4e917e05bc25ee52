//! Integration test modules for sfera
//!
//! - scenarios: reference layouts rendered end to end
//! - renderer: block mixer behaviour
//! - control: configuration-thread API

pub mod control;
pub mod renderer;
pub mod scenarios;
