// Behavior Points - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod accounts;   // Signup, login and profile validation
pub mod config;     // Environment-driven settings
pub mod db;         // SQLite store: students, users, ledger, events
pub mod entities;   // Student, Behavior, UserProfile models
pub mod ledger;     // Applies one behavior to one student
pub mod ranking;    // Leaderboard ordering
pub mod service;    // Owns registry + catalog + store

#[cfg(feature = "server")]
pub mod api;        // REST API with Axum

// Re-export commonly used types
pub use accounts::{FieldError, LoginRequest, ProfileUpdate, SignupRequest};
pub use config::Config;
pub use db::{
    Event, StoredUser,
    setup_database, insert_student, get_all_students, count_students,
    record_ledger_entry, get_ledger_entries, insert_event, get_events_for_entity,
    load_roster_csv,
};
pub use entities::{
    Student, StudentRegistry, STARTING_BALANCE,
    Behavior, BehaviorCatalog, BehaviorDefinition, CatalogError, Polarity, SEVERE_THRESHOLD,
    Actor, Role, UserProfile,
};
pub use ledger::{
    apply, ClampNotice, LedgerEntry, LedgerOutcome, ValidationError, MIN_JUSTIFICATION_CHARS,
};
pub use ranking::{rank, rank_of, LeaderboardEntry};
pub use service::{
    ActivityItem, Dashboard, ImportSummary, LedgerReceipt, PointsService,
    RegistrationRequest, ServiceError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
