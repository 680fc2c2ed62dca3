//! Voice-time tracking and role progression.
//!
//! Pure bookkeeping lives here: per-member ledger entries, the geometric
//! threshold generator, the role-ladder snapshot, the progression state
//! machine, and the flat-file member store. The Discord-facing wiring is in
//! `plugin::presence`.

pub mod entry;
pub mod intervals;
pub mod ladder;
pub mod progression;
pub mod store;

pub use entry::LedgerEntry;
pub use ladder::{RoleLadder, RoleRank};
pub use progression::{Progression, RoleDelta};
pub use store::MemberStore;
