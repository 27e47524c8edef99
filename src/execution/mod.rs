//! # Execution Module
//!
//! Dispatch of work into an isolated execution realm reached only by
//! message passing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  RealmRequest frame  ┌─────────────────┐
//! │ WorkerDispatcher │ ───────────────────▶ │  Realm (task)   │
//! │  pending[id]     │ ◀─────────────────── │  WorkerHandler  │
//! └──────────────────┘   RealmReply frame   └─────────────────┘
//! ```
//!
//! - [`WorkerDispatcher`]: correlation, timeout, cancellation, teardown
//! - [`realm`]: realm host collaborator plus the in-process tokio host
//! - [`messages`]: serialized frames crossing the boundary
//! - [`isolated`]: provider calls executed inside the realm

pub mod dispatcher;
pub mod isolated;
pub mod messages;
pub mod realm;

pub use dispatcher::WorkerDispatcher;
pub use isolated::{IsolatedProvider, ProviderWorkerHandler};
pub use messages::{RealmReply, RealmRequest, WorkerTask};
pub use realm::{Realm, RealmHost, TokioRealmHost, WorkerHandler};
