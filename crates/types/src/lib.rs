//! Shared value types for the flatehr crates.
//!
//! [`Scalar`] and [`Temporal`] are the boundary literal types: every loosely-typed payload
//! value (flat map entries, structured leaves, context defaults) is decoded into a `Scalar`
//! exactly once and the conversion engine only ever sees those.

mod scalar;

pub use scalar::{Scalar, Temporal};
