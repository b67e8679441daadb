//! Register allocation across the temporary, input, constant and output spaces.

mod allocator;
mod constants;
mod free_list;
mod register;

pub use allocator::*;
pub use constants::{DataReadyChannels, IndexedBy};
pub use free_list::TempFreeList;
pub use register::*;
