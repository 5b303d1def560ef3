// 👤 User Accounts - who is acting, and with which role

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classes a profile can be assigned to
pub const CLASSES: [(&str, &str); 5] = [
    ("6A", "Turma 6A"),
    ("6B", "Turma 6B"),
    ("7A", "Turma 7A"),
    ("7B", "Turma 7B"),
    ("8A", "Turma 8A"),
];

/// Stock avatars offered on the profile page
pub const AVATARS: [&str; 6] = [
    "https://picsum.photos/seed/avatar1/200",
    "https://picsum.photos/seed/avatar2/200",
    "https://picsum.photos/seed/avatar3/200",
    "https://picsum.photos/seed/avatar4/200",
    "https://picsum.photos/seed/avatar5/200",
    "https://picsum.photos/seed/avatar6/200",
];

pub fn is_known_class(class_id: &str) -> bool {
    CLASSES.iter().any(|(id, _)| *id == class_id)
}

// ============================================================================
// ROLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
    Parent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
            Role::Parent => "parent",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_lowercase().as_str() {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            "parent" => Some(Role::Parent),
            _ => None,
        }
    }

    /// The registration flow is closed to students
    pub fn can_register_behaviors(&self) -> bool {
        !matches!(self, Role::Student)
    }

    /// Roles that can be chosen at signup
    pub fn is_self_service(&self) -> bool {
        matches!(self, Role::Student | Role::Teacher)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ACTOR
// ============================================================================

/// Authenticated caller, as supplied by the identity collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub uid: String,
    pub role: Role,
}

impl Actor {
    pub fn new(uid: impl Into<String>, role: Role) -> Self {
        Actor { uid: uid.into(), role }
    }
}

// ============================================================================
// USER PROFILE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn actor(&self) -> Actor {
        Actor::new(self.uid.clone(), self.role)
    }
}
