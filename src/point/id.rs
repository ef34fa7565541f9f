//! Identity types for points and listeners.
//!
//! Both IDs are newtypes over `u32`. `PointId` is a direct index into the
//! registry's point arena, so every per-point table can be keyed by it.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Index into `PointRegistry::points`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct PointId(pub u32);

impl PointId {
    pub const INVALID: PointId = PointId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "PointId(INVALID)")
        } else {
            write!(f, "PointId({})", self.0)
        }
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Process-unique identity of a bus listener.
///
/// Allocated once per listener instance; unsubscription matches on this
/// value, not on the listener's address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u32);

static NEXT_LISTENER_ID: AtomicU32 = AtomicU32::new(0);

impl ListenerId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}
