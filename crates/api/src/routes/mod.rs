//! HTTP and WebSocket route handlers.

pub mod aggregates;
pub mod bookings;
pub mod guides;
pub mod health;
pub mod live;
pub mod metrics;
