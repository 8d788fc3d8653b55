//! Generational slot arena backing Graft aggregate graphs.
//!
//! Nodes and collections live in [`Arena`] slots and refer to each other
//! by id only, so ownership flows strictly from the graph into the arena
//! and parent back-references never keep a detached subgraph alive.
//! Each slot carries a generation counter: freeing a slot bumps it, which
//! makes every outstanding id for the old occupant resolve to `None`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod arena;
pub mod key;

pub use arena::Arena;
pub use key::ArenaKey;
