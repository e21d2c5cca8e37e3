//! Mailsift: deterministic, explainable email triage.
//!
//! Classifies a message (or the last message of a thread) into an intent,
//! extracted entities, thread context, a mail-vs-ads category and a list
//! of validated suggested actions. Every decision is traceable to a
//! matched pattern or signal through the pipeline trace.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod types;

pub mod patterns;

pub mod classifier;
pub mod extractors;
pub mod rules;

pub mod pipeline;
pub mod providers;
