//! Reconciliation engine for a remote managed cache instance.
//!
//! The engine drives one instance from its observed configuration to a
//! desired configuration by issuing control-plane mutations and
//! polling status until convergence. Each reconciliation is a single
//! synchronous flow per instance: at most one mutation is in flight at
//! a time, and the only suspension points are the cooperative sleeps
//! between polls. Independent instances can be reconciled concurrently
//! by the caller; the engine holds no state shared across them.
//!
//! Timeouts are wall-clock only. A `Timeout` result means the engine
//! stopped waiting, not that the remote side stopped working: an
//! accepted operation keeps executing out-of-band, so the instance's
//! true state is unknown until the next read.

pub mod classify;
pub mod invoker;
pub mod reconciler;
pub mod waiter;

pub use classify::{classify, Disposition};
pub use invoker::{invoke, InvokeOutcome};
pub use reconciler::{
    create_instance, delete_instance, import_instance, plan, reconcile, PlannedStep,
    CREATE_BAD_STATUSES, DELETE_TARGET_STATUSES, UPDATE_BAD_STATUSES,
};
pub use waiter::wait_for;
