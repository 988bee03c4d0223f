//! Notification persistence.
//!
//! The dispatcher only sees the [`NotificationStore`] / [`UnitOfWork`] pair.
//! Request-handling code writes through [`NotificationService`].

pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;

pub use memory::InMemoryNotificationStore;
pub use postgres::PgNotificationStore;
pub use service::{NewNotification, NotificationService, UpdateNotificationParams};
pub use store::{NotificationStore, UnitOfWork};
