//! Linking: address assignment, label resolution, relocation patching,
//! veneer synthesis for out-of-range runtime calls, and listings.

pub mod linker;
pub mod listing;
pub mod patch;

pub use linker::{LinkError, LinkedModule, Linker, veneer_label};
pub use listing::format_listing;
