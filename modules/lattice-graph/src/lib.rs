pub mod client;
pub mod differ;
pub mod resolver;
pub mod store;
pub mod sync;
#[cfg(feature = "test-utils")]
pub mod testutil;

pub use client::GraphClient;
pub use differ::{diff, EdgeDiff};
pub use neo4rs::query;
pub use resolver::{IdentityResolver, Resolved};
pub use store::{EdgeKind, EntityStore};
pub use sync::{BatchSynchronizer, UpsertReport};
