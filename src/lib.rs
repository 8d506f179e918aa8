//! Polls HTTP endpoints on a fixed interval, checks that each body looks like
//! a healthy JSON answer, and mails one aggregated report when any check fails.

pub mod checker;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod mailer;
pub mod models;
pub mod validation;
