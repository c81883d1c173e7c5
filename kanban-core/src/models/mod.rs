//! Board data model.
//!
//! Field names on the wire are camelCase. Decoding is tolerant: missing
//! fields take their defaults and the `id` of a column or task always comes
//! from its document id.

mod board;
mod column;
mod ids;
mod profile;
mod task;

pub use board::Board;
pub use column::Column;
pub use ids::{next_sequence, sequence_of, IdKind};
pub use profile::{Profile, ProfileUpdate, Theme};
pub use task::Task;
