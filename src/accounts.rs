// 🔑 Accounts - signup, login and profile rules
//
// Field-level validation mirrors the forms: every failing field is
// reported, not just the first one.

use crate::entities::user::{is_known_class, Role};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const MIN_NAME_CHARS: usize = 2;
pub const MIN_PASSWORD_CHARS: usize = 6;

// ============================================================================
// FIELD ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: &str) -> Self {
        FieldError {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub type FieldResult = Result<(), Vec<FieldError>>;

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub activation_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: String,
    /// Empty string clears the photo
    #[serde(default)]
    pub photo_url: String,
    pub class_id: String,
}

// ============================================================================
// VALIDATION
// ============================================================================

pub fn validate_signup(req: &SignupRequest, teacher_activation_code: &str) -> FieldResult {
    let mut errors = Vec::new();

    if req.name.trim().chars().count() < MIN_NAME_CHARS {
        errors.push(FieldError::new("name", "O nome deve ter pelo menos 2 caracteres."));
    }

    if !is_valid_email(&req.email) {
        errors.push(FieldError::new("email", "Por favor, insira um e-mail válido."));
    }

    if req.password.chars().count() < MIN_PASSWORD_CHARS {
        errors.push(FieldError::new("password", "A senha deve ter pelo menos 6 caracteres."));
    }

    if !req.role.is_self_service() {
        errors.push(FieldError::new("role", "Você precisa selecionar um tipo de conta."));
    }

    if req.role == Role::Teacher {
        match req.activation_code.as_deref().map(str::trim) {
            None | Some("") => errors.push(FieldError::new(
                "activationCode",
                "Código de ativação é obrigatório para professores.",
            )),
            Some(code) if code != teacher_activation_code => {
                errors.push(FieldError::new("activationCode", "Código de ativação inválido."))
            }
            Some(_) => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn validate_profile_update(update: &ProfileUpdate) -> FieldResult {
    let mut errors = Vec::new();

    if update.display_name.trim().chars().count() < MIN_NAME_CHARS {
        errors.push(FieldError::new("displayName", "O nome deve ter pelo menos 2 caracteres."));
    }

    let photo = update.photo_url.trim();
    if !photo.is_empty() && !is_valid_http_url(photo) {
        errors.push(FieldError::new("photoURL", "Por favor, insira uma URL válida."));
    }

    if !is_known_class(update.class_id.trim()) {
        errors.push(FieldError::new("classId", "Por favor, selecione uma turma."));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email.trim())
}

pub fn is_valid_http_url(value: &str) -> bool {
    match url::Url::parse(value) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some(),
        Err(_) => false,
    }
}

/// Emails are compared case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// PASSWORDS
// ============================================================================

pub fn new_salt() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// SHA-256 hex digest of `salt:password`
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", salt, password));
    format!("{:x}", hasher.finalize())
}

pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    hash_password(password, salt) == expected_hash
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: &str = "dolores@222";

    fn signup(role: Role, code: Option<&str>) -> SignupRequest {
        SignupRequest {
            name: "Emily White".to_string(),
            email: "emily@school.example".to_string(),
            password: "secret1".to_string(),
            role,
            activation_code: code.map(str::to_string),
        }
    }

    fn fields(result: FieldResult) -> Vec<String> {
        result
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect()
    }

    #[test]
    fn test_valid_student_signup() {
        assert!(validate_signup(&signup(Role::Student, None), CODE).is_ok());
    }

    #[test]
    fn test_teacher_signup_requires_activation_code() {
        assert!(validate_signup(&signup(Role::Teacher, Some(CODE)), CODE).is_ok());

        let missing = validate_signup(&signup(Role::Teacher, None), CODE).unwrap_err();
        assert_eq!(missing[0].message, "Código de ativação é obrigatório para professores.");

        let wrong = validate_signup(&signup(Role::Teacher, Some("guess")), CODE).unwrap_err();
        assert_eq!(wrong[0].message, "Código de ativação inválido.");
    }

    #[test]
    fn test_admin_and_parent_are_not_self_service() {
        assert_eq!(fields(validate_signup(&signup(Role::Admin, None), CODE)), vec!["role"]);
        assert_eq!(fields(validate_signup(&signup(Role::Parent, None), CODE)), vec!["role"]);
    }

    #[test]
    fn test_signup_reports_every_bad_field() {
        let req = SignupRequest {
            name: " A ".to_string(),
            email: "not-an-email".to_string(),
            password: "123".to_string(),
            role: Role::Student,
            activation_code: None,
        };

        assert_eq!(
            fields(validate_signup(&req, CODE)),
            vec!["name", "email", "password"]
        );
    }

    #[test]
    fn test_email_syntax() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("  maria.garcia@escola.edu.br "));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email(""));
        assert_eq!(normalize_email(" Maria@Escola.COM "), "maria@escola.com");
    }

    #[test]
    fn test_profile_update_rules() {
        let ok = ProfileUpdate {
            display_name: "Sam".to_string(),
            photo_url: "https://picsum.photos/seed/avatar2/200".to_string(),
            class_id: "7A".to_string(),
        };
        assert!(validate_profile_update(&ok).is_ok());

        let cleared = ProfileUpdate { photo_url: String::new(), ..ok.clone() };
        assert!(validate_profile_update(&cleared).is_ok());

        let bad = ProfileUpdate {
            display_name: "S".to_string(),
            photo_url: "ftp://files.example/me.png".to_string(),
            class_id: "".to_string(),
        };
        assert_eq!(
            fields(validate_profile_update(&bad)),
            vec!["displayName", "photoURL", "classId"]
        );
    }

    #[test]
    fn test_password_hashing() {
        let salt = new_salt();
        let hash = hash_password("secret1", &salt);

        assert_eq!(hash.len(), 64);
        assert!(verify_password("secret1", &salt, &hash));
        assert!(!verify_password("secret2", &salt, &hash));
        assert_ne!(hash, hash_password("secret1", &new_salt()));
    }
}
