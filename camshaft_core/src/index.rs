//! The packed priority key carried by every reaction.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const LEVEL_BITS: u32 = 16;
const LEVEL_MASK: u64 = (1 << LEVEL_BITS) - 1;
const DEADLINE_MASK: u64 = !LEVEL_MASK >> LEVEL_BITS;

/// A 64-bit min-priority key: the deadline occupies the 48 most significant
/// bits, the level (topological depth) the 16 least significant bits.
///
/// The scheduler treats the key as opaque apart from [`ReactionIndex::level`];
/// a smaller key means higher priority, so ordering by deadline dominates and
/// the level breaks ties among equal deadlines.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ReactionIndex(u64);

impl ReactionIndex {
    /// Pack a deadline and a level into a key. Deadline bits beyond the
    /// upper 48 are discarded.
    pub const fn new(deadline: u64, level: u16) -> Self {
        Self(((deadline & DEADLINE_MASK) << LEVEL_BITS) | level as u64)
    }

    /// A key with no deadline: ordering degenerates to the level.
    pub const fn from_level(level: u16) -> Self {
        Self(level as u64)
    }

    /// The topological depth of the reaction, the only decomposition the
    /// scheduler performs.
    pub const fn level(self) -> u16 {
        (self.0 & LEVEL_MASK) as u16
    }

    /// The raw packed value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for ReactionIndex {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Debug for ReactionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ReactionIndex(deadline={}, level={})",
            self.0 >> LEVEL_BITS,
            self.level()
        )
    }
}
