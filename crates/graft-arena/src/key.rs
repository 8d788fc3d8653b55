//! Keys that address arena slots.

use graft_core::{CollectionId, NodeId};

/// An id that encodes an arena slot index and generation.
///
/// Implemented for the graph's handle types so one [`Arena`](crate::Arena)
/// implementation serves nodes and collections without mixing their ids.
pub trait ArenaKey: Copy + Eq {
    /// Build a key from a slot index and generation.
    fn from_parts(index: u32, generation: u32) -> Self;

    /// Slot index.
    fn index(self) -> u32;

    /// Slot generation at allocation time.
    fn generation(self) -> u32;
}

impl ArenaKey for NodeId {
    fn from_parts(index: u32, generation: u32) -> Self {
        NodeId::new(index, generation)
    }

    fn index(self) -> u32 {
        self.index
    }

    fn generation(self) -> u32 {
        self.generation
    }
}

impl ArenaKey for CollectionId {
    fn from_parts(index: u32, generation: u32) -> Self {
        CollectionId::new(index, generation)
    }

    fn index(self) -> u32 {
        self.index
    }

    fn generation(self) -> u32 {
        self.generation
    }
}
