//! Lead lifecycle and automation engine for the Meridian Tax platform.
//!
//! Four services decide how an anonymous marketing click becomes a scored,
//! assigned, and nurtured lead:
//!
//! - [`activity::ActivityService`]: append-only record of everything that
//!   happens to a lead.
//! - [`journey::JourneyService`]: per-click progression state machine with
//!   per-link conversion aggregates.
//! - [`scoring::ScoringService`]: 0-100 lead score and urgency
//!   classification.
//! - [`workflows::WorkflowService`]: trigger/condition/action rule engine
//!   with a durable execution audit trail.
//!
//! HTTP routing, authentication, and delivery infrastructure live outside
//! this crate; route handlers and schedulers call these services directly.

pub mod activity;
pub mod config;
pub mod database;
pub mod error;
pub mod journey;
pub mod models;
pub mod scoring;
pub mod services;
pub mod workflows;

pub use error::{CoreError, CoreResult};
