pub mod reconciler;
pub mod store;

pub use reconciler::{CommitMeta, ReconcileConfig, ReconcileSnapshot, ReconcileState, Reconciler};
pub use store::{KeyValue, Store};
