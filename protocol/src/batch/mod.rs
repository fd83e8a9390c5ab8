//! # Batch Executor
//!
//! Deferred transactions run here, in submission order, each on its own
//! [`CachedStub`](crate::stub::CachedStub) overlay:
//!
//! - a task that fails leaves no trace except its failure entry,
//! - a task that succeeds has its writes merged into the real stub before
//!   the next task starts, so later tasks read earlier writes,
//! - a queued preimage is deleted whether its task succeeds or not.
//!
//! The invocation returns OK and emits one [`BatchEvent`] unless a task hits
//! an infrastructure or fatal error, in which case the whole batch aborts.

mod executor;
pub mod event;
pub mod preimage;

pub use event::{BatchEvent, TaskResponse};
pub use executor::{batch_argument, tasks_argument};
pub use preimage::PreimageView;
