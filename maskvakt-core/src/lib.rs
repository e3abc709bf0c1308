//! # maskvakt-core
//!
//! Foundation layer shared by every maskvakt crate: the values that flow
//! through the capture → detect → alert pipeline, the bounded queue used at
//! each hand-off, the clock abstraction, and the persistence contract.
//!
//! ### Key Submodules:
//! - `frame`: immutable captured frames
//! - `detection`: classification output with the face-count invariant
//! - `alert`: dispatched notification records
//! - `queue`: bounded MPMC queue with explicit backpressure
//! - `clock`: system and manually driven clocks
//! - `store`: append-only result/alert persistence contract

pub mod alert;
pub mod clock;
pub mod detection;
pub mod error;
pub mod frame;
pub mod queue;
pub mod source;
pub mod store;

pub mod prelude {
    pub use crate::alert::*;
    pub use crate::clock::*;
    pub use crate::detection::*;
    pub use crate::error::*;
    pub use crate::frame::*;
    pub use crate::queue::*;
    pub use crate::source::*;
    pub use crate::store::*;
}

pub use error::StoreError;
