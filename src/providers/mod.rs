//! Provider module for Flarelog
//!
//! This module contains the completion-backend abstraction used by the
//! title generator. Concrete backends (HTTP clients, local runtimes) live
//! in the embedding application; this crate only defines the seam.

pub mod base;

pub use base::{Provider, TitleRequest};
