//! Change fan-out for live admin dashboards.
//!
//! The [`ChangeFeedListener`] turns the gateway's raw change feed into
//! sequenced [`ChangeEvent`]s and hands them to the [`FanoutHub`], which
//! keeps a registry of observers, recomputes aggregates and delivers every
//! change after an initial snapshot, without gaps or duplicates.

pub mod aggregates;
pub mod error;
pub mod event;
pub mod hub;
pub mod listener;
pub mod observer;

pub use aggregates::{Aggregator, DashboardAggregator};
pub use error::{DeliveryError, HubError, Result};
pub use event::{AggregateSnapshot, ChangeEvent, ClientMessage, HubMessage, MetricValue};
pub use hub::{FanoutHub, HubConfig};
pub use listener::{ChangeFeedListener, ChangeSink, SequenceTracker};
pub use observer::Subscription;
