//! Atomic types used by the capture core.
//!
//! With the `portable-atomic` feature every atomic comes from the `portable-atomic` crate, which
//! supplies CAS and 64-bit atomics on targets that lack them natively.

#[cfg(feature = "portable-atomic")]
pub(crate) use portable_atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};

#[cfg(not(feature = "portable-atomic"))]
pub(crate) use core::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
