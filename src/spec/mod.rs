//! Spec algebra
//!
//! Keyed per-component lookups, placement merging, storage node resolution,
//! network selection, free-form drive group values and validation.

pub mod keyed;
pub mod network;
pub mod opmask;
pub mod placement;
pub mod storage;
pub mod validation;
pub mod value;

pub use keyed::*;
pub use network::*;
pub use opmask::*;
pub use placement::*;
pub use storage::*;
pub use validation::*;
pub use value::*;
