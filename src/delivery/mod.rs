//! Delivery engine: per-request admission and atomic commit

pub mod engine;
pub mod types;

pub use engine::DeliveryEngine;
pub use types::{Delivery, DeliveryOutcome, DeliveryRequest, DenyReason};
