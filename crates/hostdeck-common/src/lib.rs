//! Wire and domain types shared by the hostdeck client and its simulated backend.
//!
//! - [`HostId`]: opaque identifier of a managed host
//! - [`OperationKind`]: the closed set of maintenance actions a host accepts
//! - [`OperationRequest`] / [`InboundMessage`]: JSON frames exchanged over a host channel
//! - [`ActionTag`]: lifecycle tags (`<kind>_started`, `<kind>_completed`, `<kind>_failed`)
//!   decoded once into a typed value

pub mod host;
pub mod operation;
pub mod wire;

pub use host::HostId;
pub use operation::{OperationKind, ParseOperationKindError};
pub use wire::{ActionTag, InboundMessage, LifecycleStage, OperationRequest, WireError};
