//! Delivery channels.
//!
//! A channel takes one notification and reports success or a typed failure.
//! The dispatcher never interprets the failure beyond logging it.

pub mod channel;
pub mod email;
pub mod log;
pub mod telegram;
pub mod webhook;

pub use channel::{DeliveryChannel, DeliveryError, build_channel};
