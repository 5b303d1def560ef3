use crate::entities::{Role, Student, UserProfile, STARTING_BALANCE};
use crate::ledger::LedgerEntry;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Event for audit trail (every account change is an event)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Profile plus the stored password material
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub profile: UserProfile,
    pub password_hash: String,
    pub salt: String,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Students Table (registration order = seq)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            points INTEGER NOT NULL CHECK (points >= 0),
            avatar_url TEXT NOT NULL,
            class_id TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Users Table (accounts of every role)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            uid TEXT PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL,
            photo_url TEXT,
            class_id TEXT,
            password_hash TEXT NOT NULL,
            salt TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Ledger Entries Table (append-only)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_entries (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id TEXT UNIQUE NOT NULL,
            student_id TEXT NOT NULL,
            behavior_id TEXT NOT NULL,
            actor TEXT NOT NULL,
            justification TEXT NOT NULL,
            requested_delta INTEGER NOT NULL,
            applied_delta INTEGER NOT NULL,
            balance_before INTEGER NOT NULL,
            balance_after INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_student ON ledger_entries(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ============================================================================
// Students
// ============================================================================

/// Insert a student; returns false if the id is already stored
pub fn insert_student(conn: &Connection, student: &Student) -> Result<bool> {
    let result = conn.execute(
        "INSERT INTO students (id, name, points, avatar_url, class_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            student.id,
            student.name,
            student.points,
            student.avatar_url,
            student.class_id,
            student.created_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Update name, avatar and class (never the balance)
pub fn update_student_details(conn: &Connection, student: &Student) -> Result<()> {
    conn.execute(
        "UPDATE students SET name = ?1, avatar_url = ?2, class_id = ?3 WHERE id = ?4",
        params![student.name, student.avatar_url, student.class_id, student.id],
    )?;
    Ok(())
}

pub fn get_all_students(conn: &Connection) -> Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, points, avatar_url, class_id, created_at
         FROM students
         ORDER BY seq ASC",
    )?;

    let students = stmt
        .query_map([], |row| {
            let created_at: String = row.get(5)?;

            Ok(Student {
                id: row.get(0)?,
                name: row.get(1)?,
                points: row.get(2)?,
                avatar_url: row.get(3)?,
                class_id: row.get(4)?,
                created_at: parse_timestamp(5, &created_at)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(students)
}

pub fn count_students(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// Ledger
// ============================================================================

/// Store the new balance and its ledger entry atomically
pub fn record_ledger_entry(conn: &mut Connection, entry: &LedgerEntry) -> Result<()> {
    let tx = conn.transaction()?;

    let updated = tx.execute(
        "UPDATE students SET points = ?1 WHERE id = ?2",
        params![entry.balance_after, entry.student_id],
    )?;
    if updated != 1 {
        anyhow::bail!("Student not stored: {}", entry.student_id);
    }

    tx.execute(
        "INSERT INTO ledger_entries (
            entry_id, student_id, behavior_id, actor, justification,
            requested_delta, applied_delta, balance_before, balance_after, recorded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.entry_id,
            entry.student_id,
            entry.behavior_id,
            entry.actor,
            entry.justification,
            entry.requested_delta,
            entry.applied_delta,
            entry.balance_before,
            entry.balance_after,
            entry.recorded_at.to_rfc3339(),
        ],
    )?;

    tx.commit()?;
    Ok(())
}

/// Ledger entries for one student, newest first
pub fn get_ledger_entries(
    conn: &Connection,
    student_id: &str,
    limit: Option<usize>,
) -> Result<Vec<LedgerEntry>> {
    let limit = limit.map(|l| l as i64).unwrap_or(-1);

    let mut stmt = conn.prepare(
        "SELECT entry_id, student_id, behavior_id, actor, justification,
                requested_delta, applied_delta, balance_before, balance_after, recorded_at
         FROM ledger_entries
         WHERE student_id = ?1
         ORDER BY seq DESC
         LIMIT ?2",
    )?;

    let entries = stmt
        .query_map(params![student_id, limit], |row| {
            let recorded_at: String = row.get(9)?;

            Ok(LedgerEntry {
                entry_id: row.get(0)?,
                student_id: row.get(1)?,
                behavior_id: row.get(2)?,
                actor: row.get(3)?,
                justification: row.get(4)?,
                requested_delta: row.get(5)?,
                applied_delta: row.get(6)?,
                balance_before: row.get(7)?,
                balance_after: row.get(8)?,
                recorded_at: parse_timestamp(9, &recorded_at)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

// ============================================================================
// Users
// ============================================================================

pub fn insert_user(conn: &Connection, profile: &UserProfile, password_hash: &str, salt: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO users (
            uid, email, display_name, role, photo_url, class_id, password_hash, salt, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            profile.uid,
            profile.email,
            profile.display_name,
            profile.role.as_str(),
            profile.photo_url,
            profile.class_id,
            password_hash,
            salt,
            profile.created_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

pub fn update_user_profile(conn: &Connection, profile: &UserProfile) -> Result<()> {
    conn.execute(
        "UPDATE users SET display_name = ?1, photo_url = ?2, class_id = ?3 WHERE uid = ?4",
        params![profile.display_name, profile.photo_url, profile.class_id, profile.uid],
    )?;
    Ok(())
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<StoredUser>> {
    let sql = format!(
        "SELECT uid, email, display_name, role, photo_url, class_id, password_hash, salt, created_at
         FROM users WHERE {} = ?1",
        column
    );

    let user = conn
        .query_row(&sql, [value], |row| {
            let role: String = row.get(3)?;
            let created_at: String = row.get(8)?;

            let role = Role::parse(&role).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    Type::Text,
                    format!("unknown role: {}", role).into(),
                )
            })?;

            Ok(StoredUser {
                profile: UserProfile {
                    uid: row.get(0)?,
                    email: row.get(1)?,
                    display_name: row.get(2)?,
                    role,
                    photo_url: row.get(4)?,
                    class_id: row.get(5)?,
                    created_at: parse_timestamp(8, &created_at)?,
                },
                password_hash: row.get(6)?,
                salt: row.get(7)?,
            })
        })
        .optional()?;

    Ok(user)
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> Result<Option<StoredUser>> {
    query_user(conn, "email", email)
}

pub fn find_user_by_uid(conn: &Connection, uid: &str) -> Result<Option<StoredUser>> {
    query_user(conn, "uid", uid)
}

// ============================================================================
// Events
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, &timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// Roster import
// ============================================================================

/// One row of a roster CSV; only `name` is required
#[derive(Debug, Deserialize)]
struct RosterRow {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    class_id: Option<String>,
    #[serde(default)]
    points: Option<i64>,
}

pub fn load_roster_csv(csv_path: &Path) -> Result<Vec<Student>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open roster CSV")?;

    let mut students = Vec::new();

    for (line, result) in rdr.deserialize().enumerate() {
        let row: RosterRow =
            result.with_context(|| format!("Failed to read roster row {}", line + 2))?;

        let name = row.name.trim().to_string();
        if name.is_empty() {
            anyhow::bail!("Roster row {} has an empty name", line + 2);
        }

        let points = row.points.unwrap_or(STARTING_BALANCE);
        if points < 0 {
            anyhow::bail!("Roster row {} has a negative balance ({})", line + 2, points);
        }

        let avatar = row.avatar_url.filter(|a| !a.trim().is_empty()).unwrap_or_default();
        let mut student = match row.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => Student::new(id.trim(), name, avatar),
            None => Student::with_generated_id(name, avatar),
        }
        .with_points(points);
        student.class_id = row.class_id.filter(|c| !c.trim().is_empty());

        students.push(student);
    }

    Ok(students)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn entry_for(student: &Student, delta: i64) -> LedgerEntry {
        LedgerEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            student_id: student.id.clone(),
            behavior_id: "b1".to_string(),
            actor: "teacher".to_string(),
            justification: "Helped a classmate".to_string(),
            requested_delta: delta,
            applied_delta: delta,
            balance_before: student.points,
            balance_after: student.points + delta,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_students_round_trip_in_registration_order() {
        let conn = test_db();

        for (id, name) in [("z", "Zoe"), ("a", "Ana"), ("m", "Mia")] {
            assert!(insert_student(&conn, &Student::new(id, name, "")).unwrap());
        }
        // Duplicate id is skipped, not an error
        assert!(!insert_student(&conn, &Student::new("a", "Other", "")).unwrap());

        let students = get_all_students(&conn).unwrap();
        let ids: Vec<&str> = students.iter().map(|s| s.id.as_str()).collect();

        assert_eq!(ids, vec!["z", "a", "m"]);
        assert_eq!(count_students(&conn).unwrap(), 3);
        assert_eq!(students[1].name, "Ana");
    }

    #[test]
    fn test_record_ledger_entry_updates_balance() {
        let mut conn = test_db();
        let student = Student::new("s1", "Sam", "");
        insert_student(&conn, &student).unwrap();

        record_ledger_entry(&mut conn, &entry_for(&student, 20)).unwrap();

        let stored = get_all_students(&conn).unwrap();
        assert_eq!(stored[0].points, 1020);

        let entries = get_ledger_entries(&conn, "s1", None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].balance_after, 1020);
    }

    #[test]
    fn test_record_ledger_entry_for_unknown_student_fails() {
        let mut conn = test_db();
        let ghost = Student::new("ghost", "Ghost", "");

        assert!(record_ledger_entry(&mut conn, &entry_for(&ghost, 5)).is_err());
        assert!(get_ledger_entries(&conn, "ghost", None).unwrap().is_empty());
    }

    #[test]
    fn test_negative_balance_rejected_by_schema() {
        let mut conn = test_db();
        let student = Student::new("s1", "Sam", "").with_points(10);
        insert_student(&conn, &student).unwrap();

        // Bypass the applier: storage still refuses a negative balance
        assert!(record_ledger_entry(&mut conn, &entry_for(&student, -50)).is_err());
        assert_eq!(get_all_students(&conn).unwrap()[0].points, 10);
    }

    #[test]
    fn test_ledger_entries_newest_first_with_limit() {
        let mut conn = test_db();
        let mut student = Student::new("s1", "Sam", "");
        insert_student(&conn, &student).unwrap();

        for delta in [10, 15, 20, 5] {
            let entry = entry_for(&student, delta);
            record_ledger_entry(&mut conn, &entry).unwrap();
            student.points = entry.balance_after;
        }

        let recent = get_ledger_entries(&conn, "s1", Some(3)).unwrap();
        let deltas: Vec<i64> = recent.iter().map(|e| e.applied_delta).collect();

        assert_eq!(deltas, vec![5, 20, 15]);
        assert_eq!(get_ledger_entries(&conn, "s1", None).unwrap().len(), 4);
    }

    #[test]
    fn test_users_lookup() {
        let conn = test_db();
        let profile = UserProfile {
            uid: "u1".to_string(),
            email: "teacher@school.example".to_string(),
            display_name: "Ms. Lima".to_string(),
            role: Role::Teacher,
            photo_url: None,
            class_id: None,
            created_at: Utc::now(),
        };

        insert_user(&conn, &profile, "hash", "salt").unwrap();
        assert!(insert_user(&conn, &profile, "hash", "salt").is_err());

        let by_email = find_user_by_email(&conn, "teacher@school.example").unwrap().unwrap();
        assert_eq!(by_email.profile.role, Role::Teacher);
        assert_eq!(by_email.salt, "salt");

        let mut changed = by_email.profile.clone();
        changed.class_id = Some("6B".to_string());
        update_user_profile(&conn, &changed).unwrap();

        let by_uid = find_user_by_uid(&conn, "u1").unwrap().unwrap();
        assert_eq!(by_uid.profile.class_id.as_deref(), Some("6B"));
        assert!(find_user_by_uid(&conn, "nobody").unwrap().is_none());
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();

        let event = Event::new(
            "account_created",
            "user",
            "u1",
            serde_json::json!({"role": "student"}),
            "u1",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "user", "u1").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "account_created");
        assert_eq!(events[0].data["role"], "student");
    }

    #[test]
    fn test_load_roster_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,name,avatar_url,class_id,points").unwrap();
        writeln!(file, "s1,Ana Souza,https://example.com/ana.png,6A,").unwrap();
        writeln!(file, ",Bruno Lima,,,250").unwrap();
        file.flush().unwrap();

        let students = load_roster_csv(file.path()).unwrap();

        assert_eq!(students.len(), 2);
        assert_eq!(students[0].id, "s1");
        assert_eq!(students[0].points, STARTING_BALANCE);
        assert_eq!(students[0].class_id.as_deref(), Some("6A"));
        assert!(!students[1].id.is_empty());
        assert_eq!(students[1].points, 250);
        assert_eq!(students[1].class_id, None);
    }

    #[test]
    fn test_load_roster_csv_rejects_negative_balance() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,points").unwrap();
        writeln!(file, "Ana,-5").unwrap();
        file.flush().unwrap();

        assert!(load_roster_csv(file.path()).is_err());
    }
}
