//! Roster filtering: the block list and the visible-roster function.

pub mod block;
pub mod visibility;

pub use block::BlockList;
pub use visibility::visible_personas;
