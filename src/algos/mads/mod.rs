//! Mesh Adaptive Direct Search: the default algorithm, combining an
//! optional cheap search step with an exhaustive, positive-spanning poll
//! around a granular mesh.

pub mod initialization;
pub mod iteration;
pub mod megaiteration;
pub mod poll;
pub mod search;
pub mod update;

pub use initialization::{initialize, InitResult};
pub use iteration::{IterationConfig, MadsIteration};
pub use megaiteration::MegaIteration;
pub use poll::PollDirectionType;
pub use search::{NoSearch, RandomSearch, SearchMethod};
