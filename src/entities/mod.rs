// Entity Models
// Identity persists, values change:
//
// - Student: stable id, balance mutated only by the ledger
// - Behavior: immutable catalog entries, polarity derived from the delta
// - User: account profile and role of whoever is acting

pub mod student;
pub mod behavior;
pub mod user;

pub use student::{Student, StudentRegistry, STARTING_BALANCE};
pub use behavior::{Behavior, BehaviorCatalog, BehaviorDefinition, CatalogError, Polarity, SEVERE_THRESHOLD};
pub use user::{Actor, Role, UserProfile, AVATARS, CLASSES};
