//! Execution identity for a request.
//!
//! Decides whether a statement runs with owner's or caller's rights and
//! which credential material is presented to the warehouse.

mod ambient;
mod composite;
mod descriptor;
mod mode;
mod secret;

pub use ambient::{
    AmbientCredentials, IngressIdentity, SessionTokenSource, StaticConnectionParams,
    INGRESS_TOKEN_HEADER, INGRESS_USER_HEADER,
};
pub use composite::{CompositeCredential, COMPOSITE_SEPARATOR};
pub use descriptor::{
    resolve_context, resolve_mode, ConnectionDescriptor, Identity, IdentityKind,
    ResolvedContext,
};
pub use mode::{DowngradeReason, ExecutionMode, ModeResolution};
pub use secret::Secret;
