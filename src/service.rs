// 🧭 Points Service - the single owner of classroom state
//
// Holds the student registry, the behavior catalog and the store
// connection. Built once at startup and handed to callers by reference;
// there is no module-level state anywhere else.

use crate::accounts::{
    self, FieldError, LoginRequest, ProfileUpdate, SignupRequest,
};
use crate::config::{Config, DEFAULT_TEACHER_CODE};
use crate::db::{self, Event};
use crate::entities::{
    Actor, Behavior, BehaviorCatalog, Role, Student, StudentRegistry, UserProfile, AVATARS,
};
use crate::ledger::{self, LedgerEntry, LedgerOutcome, ValidationError};
use crate::ranking::{self, LeaderboardEntry};
use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, ErrorCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Entries shown under "recent activity" on the dashboard
pub const RECENT_ACTIVITY_LIMIT: usize = 3;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Confirme o registro grave: {behavior} subtrai {points} pontos de {student}.")]
    ConfirmationRequired {
        behavior: String,
        student: String,
        points: i64,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {}", format_fields(.0))]
    InvalidInput(Vec<FieldError>),

    #[error("Este e-mail já está em uso.")]
    EmailInUse,

    #[error("E-mail ou senha inválidos.")]
    InvalidCredentials,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied by the store: {0}")]
    PersistencePermissionDenied(String),

    #[error("Persistence failure: {0:#}")]
    Persistence(anyhow::Error),
}

fn format_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Classify a store failure: read-only / permission failures are surfaced
/// separately from everything else
fn store_error(err: anyhow::Error) -> ServiceError {
    let denied = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _))
                if matches!(
                    e.code,
                    ErrorCode::ReadOnly
                        | ErrorCode::PermissionDenied
                        | ErrorCode::AuthorizationForStatementDenied
                )
        )
    });

    if denied {
        ServiceError::PersistencePermissionDenied(format!("{:#}", err))
    } else {
        ServiceError::Persistence(err)
    }
}

fn sql_error(err: rusqlite::Error) -> ServiceError {
    store_error(err.into())
}

// ============================================================================
// REQUESTS & RESPONSES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationRequest {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub behavior_id: Option<String>,
    #[serde(default)]
    pub justification: String,
    /// Explicit confirmation for severe behaviors
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerReceipt {
    pub outcome: LedgerOutcome,
    pub entry: LedgerEntry,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityItem {
    pub entry: LedgerEntry,
    /// None when the behavior is no longer in the catalog
    pub behavior_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub student: Student,
    pub rank: usize,
    pub total_students: usize,
    pub recent_activity: Vec<ActivityItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct PointsService {
    students: StudentRegistry,
    catalog: BehaviorCatalog,
    teacher_activation_code: String,
    conn: Connection,
}

impl PointsService {
    /// Open the configured database and catalog
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let catalog = match &config.behaviors_path {
            Some(path) => BehaviorCatalog::from_file(path)?,
            None => BehaviorCatalog::builtin(),
        };

        let conn = Connection::open(&config.db_path)
            .with_context(|| format!("Failed to open database {:?}", config.db_path))?;

        Self::from_connection(
            conn,
            catalog,
            config.teacher_activation_code.clone(),
            config.seed_demo,
        )
    }

    /// In-memory store seeded with the demo roster
    pub fn in_memory(catalog: BehaviorCatalog) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, catalog, DEFAULT_TEACHER_CODE.to_string(), true)
    }

    pub fn from_connection(
        conn: Connection,
        catalog: BehaviorCatalog,
        teacher_activation_code: String,
        seed_demo: bool,
    ) -> anyhow::Result<Self> {
        db::setup_database(&conn)?;

        if seed_demo && db::count_students(&conn)? == 0 {
            let demo = StudentRegistry::with_demo_roster();
            for student in demo.all() {
                db::insert_student(&conn, student)?;
            }
            info!("Seeded demo roster with {} students", demo.count());
        }

        let students = StudentRegistry::from_students(db::get_all_students(&conn)?)
            .map_err(anyhow::Error::msg)?;

        info!(
            students = students.count(),
            behaviors = catalog.count(),
            "Points service ready"
        );

        Ok(PointsService {
            students,
            catalog,
            teacher_activation_code,
            conn,
        })
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn students(&self) -> &[Student] {
        self.students.all()
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.find_by_id(id)
    }

    pub fn catalog(&self) -> &BehaviorCatalog {
        &self.catalog
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        ranking::rank(self.students.all())
    }

    pub fn dashboard(&self, student_id: &str) -> Result<Dashboard, ServiceError> {
        let student = self
            .students
            .find_by_id(student_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("student {}", student_id)))?;

        let leaderboard = self.leaderboard();
        let rank = ranking::rank_of(&leaderboard, student_id).unwrap_or(0);

        let recent_activity = self.recent_activity(student_id)?;

        Ok(Dashboard {
            student,
            rank,
            total_students: leaderboard.len(),
            recent_activity,
        })
    }

    /// The newest ledger entries for a student, at most RECENT_ACTIVITY_LIMIT
    pub fn recent_activity(&self, student_id: &str) -> Result<Vec<ActivityItem>, ServiceError> {
        let entries = db::get_ledger_entries(&self.conn, student_id, Some(RECENT_ACTIVITY_LIMIT))
            .map_err(store_error)?;
        Ok(entries.into_iter().map(|e| self.activity_item(e)).collect())
    }

    /// Every ledger entry for a student, newest first
    pub fn history(&self, student_id: &str) -> Result<Vec<ActivityItem>, ServiceError> {
        if !self.students.contains(student_id) {
            return Err(ServiceError::NotFound(format!("student {}", student_id)));
        }

        let entries = db::get_ledger_entries(&self.conn, student_id, None).map_err(store_error)?;
        Ok(entries.into_iter().map(|e| self.activity_item(e)).collect())
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn activity_item(&self, entry: LedgerEntry) -> ActivityItem {
        let behavior_name = self
            .catalog
            .find_by_id(&entry.behavior_id)
            .map(|b| b.name.clone());
        ActivityItem { entry, behavior_name }
    }

    // ========================================================================
    // BEHAVIOR REGISTRATION
    // ========================================================================

    /// Apply a catalog behavior to a student on behalf of `actor`
    pub fn register_behavior(
        &mut self,
        actor: &Actor,
        req: &RegistrationRequest,
    ) -> Result<LedgerReceipt, ServiceError> {
        if !actor.role.can_register_behaviors() {
            warn!(actor = %actor.uid, role = %actor.role, "Registration refused");
            return Err(ServiceError::Forbidden(format!(
                "role {} cannot register behaviors",
                actor.role
            )));
        }

        ledger::validate_justification(&req.justification)?;

        let student = req
            .student_id
            .as_deref()
            .and_then(|id| self.students.find_by_id(id))
            .cloned();
        let behavior: Option<Behavior> = req
            .behavior_id
            .as_deref()
            .and_then(|id| self.catalog.find_by_id(id))
            .cloned();

        let (Some(mut student), Some(behavior)) = (student, behavior) else {
            return Err(ValidationError::MissingSelection.into());
        };

        if behavior.is_severe() && !req.confirmed {
            return Err(ServiceError::ConfirmationRequired {
                behavior: behavior.name.clone(),
                student: student.name.clone(),
                points: behavior.points.abs(),
            });
        }

        // Applied to a copy: the registry only changes once the store has it
        let outcome = ledger::apply(Some(&mut student), Some(&behavior), &req.justification)?;
        let entry = LedgerEntry::from_outcome(&outcome, &actor.uid, &req.justification);

        db::record_ledger_entry(&mut self.conn, &entry).map_err(store_error)?;
        self.students
            .replace(student.clone())
            .map_err(ServiceError::NotFound)?;

        if let Some(notice) = &outcome.notice {
            warn!(
                student = %student.id,
                behavior = %behavior.id,
                clamped = notice.clamped_amount,
                "Balance clamped at zero"
            );
        }
        info!(
            student = %student.id,
            behavior = %behavior.id,
            actor = %actor.uid,
            delta = outcome.applied_delta,
            balance = outcome.new_balance,
            "Behavior registered"
        );

        Ok(LedgerReceipt {
            message: outcome.summary(&student.name, &behavior.name),
            notice: outcome.notice.as_ref().map(ToString::to_string),
            outcome,
            entry,
        })
    }

    // ========================================================================
    // ACCOUNTS
    // ========================================================================

    /// Create an account; student accounts also join the registry
    pub fn sign_up(&mut self, req: &SignupRequest) -> Result<UserProfile, ServiceError> {
        accounts::validate_signup(req, &self.teacher_activation_code)
            .map_err(ServiceError::InvalidInput)?;

        let email = accounts::normalize_email(&req.email);
        if db::find_user_by_email(&self.conn, &email)
            .map_err(store_error)?
            .is_some()
        {
            return Err(ServiceError::EmailInUse);
        }

        let profile = UserProfile {
            uid: uuid::Uuid::new_v4().to_string(),
            email,
            display_name: req.name.trim().to_string(),
            role: req.role,
            photo_url: None,
            class_id: None,
            created_at: Utc::now(),
        };

        let salt = accounts::new_salt();
        let password_hash = accounts::hash_password(&req.password, &salt);

        let student = (profile.role == Role::Student)
            .then(|| Student::new(profile.uid.clone(), profile.display_name.clone(), AVATARS[0]));

        let tx = self.conn.transaction().map_err(sql_error)?;
        db::insert_user(&tx, &profile, &password_hash, &salt).map_err(store_error)?;
        if let Some(student) = &student {
            if !db::insert_student(&tx, student).map_err(store_error)? {
                return Err(ServiceError::Persistence(anyhow::anyhow!(
                    "student {} could not be stored",
                    student.id
                )));
            }
        }
        let event = Event::new(
            "account_created",
            "user",
            &profile.uid,
            serde_json::json!({ "role": profile.role.as_str() }),
            &profile.uid,
        );
        db::insert_event(&tx, &event).map_err(store_error)?;
        tx.commit().map_err(sql_error)?;

        if let Some(student) = student {
            self.students
                .register(student)
                .map_err(|e| ServiceError::Persistence(anyhow::Error::msg(e)))?;
        }

        info!(uid = %profile.uid, role = %profile.role, "Account created");
        Ok(profile)
    }

    pub fn log_in(&self, req: &LoginRequest) -> Result<UserProfile, ServiceError> {
        let email = accounts::normalize_email(&req.email);
        let stored = db::find_user_by_email(&self.conn, &email)
            .map_err(store_error)?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !accounts::verify_password(&req.password, &stored.salt, &stored.password_hash) {
            debug!(uid = %stored.profile.uid, "Password mismatch");
            return Err(ServiceError::InvalidCredentials);
        }

        Ok(stored.profile)
    }

    pub fn profile(&self, uid: &str) -> Result<UserProfile, ServiceError> {
        db::find_user_by_uid(&self.conn, uid)
            .map_err(store_error)?
            .map(|stored| stored.profile)
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", uid)))
    }

    /// Update a profile; owners edit their own, admins edit anyone's
    pub fn update_profile(
        &mut self,
        actor: &Actor,
        uid: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, ServiceError> {
        if actor.uid != uid && actor.role != Role::Admin {
            return Err(ServiceError::Forbidden(format!(
                "{} cannot edit the profile of {}",
                actor.uid, uid
            )));
        }

        accounts::validate_profile_update(update).map_err(ServiceError::InvalidInput)?;

        let mut profile = self.profile(uid)?;
        let photo = update.photo_url.trim();
        profile.display_name = update.display_name.trim().to_string();
        profile.photo_url = (!photo.is_empty()).then(|| photo.to_string());
        profile.class_id = Some(update.class_id.trim().to_string());

        let student = self.students.find_by_id(uid).cloned().map(|mut student| {
            student.name = profile.display_name.clone();
            student.avatar_url = profile
                .photo_url
                .clone()
                .unwrap_or_else(|| AVATARS[0].to_string());
            student.class_id = profile.class_id.clone();
            student
        });

        let tx = self.conn.transaction().map_err(sql_error)?;
        db::update_user_profile(&tx, &profile).map_err(store_error)?;
        if let Some(student) = &student {
            db::update_student_details(&tx, student).map_err(store_error)?;
        }
        let event = Event::new(
            "profile_updated",
            "user",
            uid,
            serde_json::json!({
                "display_name": profile.display_name,
                "class_id": profile.class_id,
            }),
            &actor.uid,
        );
        db::insert_event(&tx, &event).map_err(store_error)?;
        tx.commit().map_err(sql_error)?;

        if let Some(student) = student {
            self.students.replace(student).map_err(ServiceError::NotFound)?;
        }

        info!(uid = %uid, actor = %actor.uid, "Profile updated");
        Ok(profile)
    }

    // ========================================================================
    // ROSTER IMPORT
    // ========================================================================

    /// Add students not already registered; existing ids are skipped
    pub fn import_students(&mut self, students: Vec<Student>) -> Result<ImportSummary, ServiceError> {
        let mut summary = ImportSummary::default();

        for student in students {
            if self.students.contains(&student.id) {
                summary.skipped += 1;
                continue;
            }

            if db::insert_student(&self.conn, &student).map_err(store_error)? {
                self.students
                    .register(student)
                    .map_err(|e| ServiceError::Persistence(anyhow::Error::msg(e)))?;
                summary.inserted += 1;
            } else {
                summary.skipped += 1;
            }
        }

        info!(
            inserted = summary.inserted,
            skipped = summary.skipped,
            "Roster import finished"
        );
        Ok(summary)
    }
}

// ============================================================================
// TESTS
// ============================================================================
