// 🎒 Student Entity - identity + point balance
//
// "Student id is IDENTITY (never changes), balance is a VALUE (changes
// only through the ledger)"
//
// The registry keeps students in registration order. That order is the
// tie-break the ranking engine relies on, so it is never re-sorted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Balance every new account starts with
pub const STARTING_BALANCE: i64 = 1000;

// ============================================================================
// STUDENT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    // ========================================================================
    // IDENTITY (never changes)
    // ========================================================================
    /// Opaque identity, shared with the owning user account when there is one
    pub id: String,

    // ========================================================================
    // VALUES
    // ========================================================================
    pub name: String,

    /// Current balance. Never negative.
    pub points: i64,

    pub avatar_url: String,

    /// Class the student belongs to (6A, 7B, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Student {
    /// Create a student with the starting balance
    pub fn new(id: impl Into<String>, name: impl Into<String>, avatar_url: impl Into<String>) -> Self {
        Student {
            id: id.into(),
            name: name.into(),
            points: STARTING_BALANCE,
            avatar_url: avatar_url.into(),
            class_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create a student with a freshly generated UUID identity
    pub fn with_generated_id(name: impl Into<String>, avatar_url: impl Into<String>) -> Self {
        Student::new(uuid::Uuid::new_v4().to_string(), name, avatar_url)
    }

    pub fn with_points(mut self, points: i64) -> Self {
        self.points = points.max(0);
        self
    }

    pub fn with_class(mut self, class_id: impl Into<String>) -> Self {
        self.class_id = Some(class_id.into());
        self
    }

    /// First word of the display name (leaderboard shows only this)
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }

    /// Uppercase initials, e.g. "Maria Garcia" -> "MG"
    pub fn initials(&self) -> String {
        self.name
            .split_whitespace()
            .filter_map(|part| part.chars().next())
            .flat_map(|c| c.to_uppercase())
            .collect()
    }
}

// ============================================================================
// STUDENT REGISTRY
// ============================================================================

/// All known students, in registration order
#[derive(Debug, Clone, Default)]
pub struct StudentRegistry {
    students: Vec<Student>,
}

impl StudentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        StudentRegistry { students: Vec::new() }
    }

    /// The five demo students every fresh classroom starts with
    pub fn with_demo_roster() -> Self {
        let mut registry = StudentRegistry::new();

        for (id, name) in [
            ("1", "Alex Johnson"),
            ("2", "Maria Garcia"),
            ("3", "Sam Chen"),
            ("4", "Emily White"),
            ("5", "James Brown"),
        ] {
            let seed = name.split_whitespace().next().unwrap_or(id).to_lowercase();
            let avatar = format!("https://picsum.photos/seed/{}/100/100", seed);
            // ids are distinct literals
            let _ = registry.register(Student::new(id, name, avatar));
        }

        registry
    }

    /// Build a registry from an ordered list, rejecting duplicate ids
    pub fn from_students(students: Vec<Student>) -> Result<Self, String> {
        let mut registry = StudentRegistry::new();
        for student in students {
            registry.register(student)?;
        }
        Ok(registry)
    }

    /// Register a new student at the end of the registry
    pub fn register(&mut self, student: Student) -> Result<(), String> {
        if self.contains(&student.id) {
            return Err(format!("Student already registered: {}", student.id));
        }
        self.students.push(student);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.students.iter().any(|s| s.id == id)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    /// Replace the stored value for an existing student
    pub fn replace(&mut self, student: Student) -> Result<(), String> {
        let slot = self
            .students
            .iter_mut()
            .find(|s| s.id == student.id)
            .ok_or_else(|| format!("Student not found: {}", student.id))?;
        *slot = student;
        Ok(())
    }

    /// Students in registration order
    pub fn all(&self) -> &[Student] {
        &self.students
    }

    pub fn by_class(&self, class_id: &str) -> Vec<Student> {
        self.students
            .iter()
            .filter(|s| s.class_id.as_deref() == Some(class_id))
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_student_starts_with_starting_balance() {
        let student = Student::with_generated_id("Test Student", "https://example.com/a.png");

        assert!(!student.id.is_empty());
        assert_eq!(student.points, STARTING_BALANCE);
        assert_eq!(student.class_id, None);
    }

    #[test]
    fn test_with_points_never_negative() {
        let student = Student::new("x", "X", "").with_points(-40);
        assert_eq!(student.points, 0);
    }

    #[test]
    fn test_first_name_and_initials() {
        let student = Student::new("2", "Maria Garcia", "");
        assert_eq!(student.first_name(), "Maria");
        assert_eq!(student.initials(), "MG");
    }

    #[test]
    fn test_demo_roster() {
        let registry = StudentRegistry::with_demo_roster();

        assert_eq!(registry.count(), 5);
        assert!(registry.all().iter().all(|s| s.points == 1000));
        assert_eq!(registry.all()[0].name, "Alex Johnson");
        assert_eq!(
            registry.find_by_id("3").map(|s| s.avatar_url.as_str()),
            Some("https://picsum.photos/seed/sam/100/100")
        );
    }

    #[test]
    fn test_register_rejects_duplicate_id() {
        let mut registry = StudentRegistry::new();
        registry.register(Student::new("a", "Ana", "")).unwrap();

        let result = registry.register(Student::new("a", "Another Ana", ""));
        assert!(result.is_err());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry = StudentRegistry::from_students(vec![
            Student::new("z", "Zoe", ""),
            Student::new("a", "Ana", ""),
            Student::new("m", "Mia", ""),
        ])
        .unwrap();

        let ids: Vec<&str> = registry.all().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_replace_and_by_class() {
        let mut registry = StudentRegistry::new();
        registry.register(Student::new("a", "Ana", "").with_class("6A")).unwrap();
        registry.register(Student::new("b", "Bia", "").with_class("7B")).unwrap();

        let mut updated = registry.find_by_id("a").unwrap().clone();
        updated.points = 900;
        registry.replace(updated).unwrap();

        assert_eq!(registry.find_by_id("a").unwrap().points, 900);
        assert_eq!(registry.by_class("7B").len(), 1);
        assert!(registry.replace(Student::new("nope", "Nope", "")).is_err());
    }
}
