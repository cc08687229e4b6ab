//! Interfaces to the collaborators the runtime consumes.
//!
//! - [`NetworkExecutor`]: performs outbound calls for `api_call` nodes
//! - [`Clock`]: suspends tasks for timers and retry backoff
//! - [`WorkflowStore`]: loads definitions and persists results
//!
//! Each interface ships with a default implementation; a scripted
//! [`MockNetwork`] is available behind the `mock` feature.

mod clock;
#[cfg(any(test, feature = "mock"))]
#[cfg_attr(docsrs, doc(cfg(feature = "mock")))]
mod mock;
mod network;
mod store;

pub use clock::{Clock, TokioClock};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockNetwork;
pub use network::{
    NetworkError, NetworkErrorKind, NetworkExecutor, NetworkRequest, NetworkResponse, NoNetwork,
};
pub use store::{MemoryStore, WorkflowStore};
