//! Prompt module for LLM-based operations.
//!
//! This module provides prompt templates for LLM tasks.

pub mod query_expansion;

pub use query_expansion::*;
