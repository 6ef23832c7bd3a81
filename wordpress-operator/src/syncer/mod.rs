//! Child object synchronization.
//!
//! A [`Syncer`] owns exactly one object derived from a parent and converges
//! it toward the parent's desired state. The orchestrator, [`sync_all`], runs
//! an ordered list of syncers for one parent and stops at the first failure.
//!
//! # Implementation Notes
//!
//! - Syncers are rebuilt every pass; they hold no state across passes
//! - `sync` must be idempotent: a second call with no external change
//!   reports [`SyncOperation::Unchanged`] and performs no write
//! - Dependencies between children are expressed by list order only

mod object;

pub use object::{MutateFn, ObjectHandle, ObjectSyncer};

use crate::error::OperatorResult;
use crate::events::{Event, EventRecorder};
use crate::store::{ObjectKey, Store};
use k8s_openapi::api::core::v1::ObjectReference;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Type alias for async sync futures.
pub type SyncFuture<'a> = Pin<Box<dyn Future<Output = OperatorResult<SyncResult>> + Send + 'a>>;

/// What a sync did to its child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    /// The child did not exist and was created.
    Created,
    /// The child drifted and was updated.
    Updated,
    /// The child already matched; nothing was written.
    Unchanged,
}

impl SyncOperation {
    /// Whether the store was written.
    pub fn mutated(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Updated => f.write_str("updated"),
            Self::Unchanged => f.write_str("unchanged"),
        }
    }
}

/// Outcome of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    /// Kind of the child, e.g. `Deployment`.
    pub kind: String,
    /// Key of the child.
    pub key: ObjectKey,
    /// What happened.
    pub operation: SyncOperation,
}

impl SyncResult {
    /// Event reason for this outcome, e.g. `SecretSyncSuccessful`.
    pub fn reason(&self) -> String {
        format!("{}SyncSuccessful", self.kind)
    }

    /// Event message for this outcome, e.g. `Secret sites/blog-wp created`.
    pub fn message(&self) -> String {
        format!("{} {} {}", self.kind, self.key, self.operation)
    }
}

/// A unit converging one child object.
///
/// The orchestrator only sees this trait; it never knows the concrete kind
/// of the children it drives.
pub trait Syncer<S: Store>: Send + Sync {
    /// Syncer name, used in logs and errors.
    fn name(&self) -> &str;

    /// Kind of the child object.
    fn kind(&self) -> String;

    /// Key of the child object.
    fn object_key(&self) -> ObjectKey;

    /// Converge the child.
    ///
    /// # Errors
    ///
    /// - `SyncError` if the desired state cannot be computed
    /// - `AlreadyOwned` if another controller owns the child
    /// - any store error from the read or write
    fn sync<'a>(&'a self, store: &'a S) -> SyncFuture<'a>;
}

/// Run `syncers` in order, stopping at the first error.
///
/// One event is recorded against `owner` per syncer outcome. Syncers after a
/// failing one are never invoked; children already synced stay as written.
pub async fn sync_all<S: Store>(
    store: &S,
    recorder: &dyn EventRecorder,
    owner: &ObjectReference,
    syncers: &[Box<dyn Syncer<S>>],
) -> OperatorResult<Vec<SyncResult>> {
    let mut results = Vec::with_capacity(syncers.len());

    for syncer in syncers {
        match syncer.sync(store).await {
            Ok(result) => {
                tracing::debug!(
                    syncer = %syncer.name(),
                    key = %result.key,
                    operation = %result.operation,
                    "Synced child"
                );
                recorder
                    .record(owner, Event::normal(result.reason(), result.message()))
                    .await;
                results.push(result);
            }
            Err(e) => {
                tracing::warn!(
                    syncer = %syncer.name(),
                    key = %syncer.object_key(),
                    error = %e,
                    "Sync failed"
                );
                recorder
                    .record(
                        owner,
                        Event::warning(format!("{}SyncFailed", syncer.kind()), e.to_string()),
                    )
                    .await;
                return Err(e);
            }
        }
    }

    Ok(results)
}
