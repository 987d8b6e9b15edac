//! Narrow interface over the external record store.
//!
//! Every call is a single logical operation that is durable once it returns
//! `Ok`. There are no retries and no cross-call transactions; callers that
//! need multi-record consistency build it on top (see the `saga` crate).

pub mod change;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod postgres;
pub mod record;

pub use change::{ChangeOperation, ChangeStream, RawChange};
pub use common::RecordId;
pub use error::{GatewayError, Result};
pub use gateway::{ResourceGateway, ResourceGatewayExt};
pub use memory::{Fault, InMemoryResourceGateway};
pub use postgres::PostgresResourceGateway;
pub use record::{NewRecord, Record};
