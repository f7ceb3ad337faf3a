//! HTTP handlers

pub mod health;
pub mod relay;
pub mod dashboard;
