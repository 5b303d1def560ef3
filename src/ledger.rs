// 📒 Ledger Applier - one behavior, one student, one new balance
//
// The only path that changes a student's balance. Negative behaviors that
// would push the balance below zero are clamped so the balance lands on
// exactly zero; that is a successful application with an informational
// notice, never an error.

use crate::entities::{Behavior, Student};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum justification length, counted on the trimmed text
pub const MIN_JUSTIFICATION_CHARS: usize = 10;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Seleção incompleta: selecione um aluno e uma ação.")]
    MissingSelection,

    #[error("A justificativa deve ter pelo menos {min} caracteres (recebidos {actual}).")]
    JustificationTooShort { min: usize, actual: usize },
}

// ============================================================================
// OUTCOME
// ============================================================================

/// Informational notice emitted when a negative delta was clamped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClampNotice {
    pub student_name: String,
    /// Points actually subtracted (magnitude)
    pub clamped_amount: i64,
}

impl std::fmt::Display for ClampNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} não pode ter pontos negativos. Apenas {} pontos foram subtraídos para zerar o saldo.",
            self.student_name, self.clamped_amount
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerOutcome {
    pub student_id: String,
    pub behavior_id: String,
    pub previous_balance: i64,
    pub new_balance: i64,
    /// Delta as defined by the behavior
    pub requested_delta: i64,
    /// Delta after clamping
    pub applied_delta: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<ClampNotice>,
}

impl LedgerOutcome {
    pub fn was_clamped(&self) -> bool {
        self.notice.is_some()
    }

    /// Confirmation text shown to the registering actor
    pub fn summary(&self, student_name: &str, behavior_name: &str) -> String {
        let action = if self.applied_delta > 0 { "adicionados" } else { "subtraídos" };
        format!(
            "{} pontos foram {} para {} por {}.",
            self.applied_delta.abs(),
            action,
            student_name,
            behavior_name
        )
    }
}

// ============================================================================
// APPLIER
// ============================================================================

/// Apply `behavior` to `student`, mutating the student's balance
///
/// The justification is checked first, so a short justification is reported
/// even when the selection is also incomplete.
pub fn apply(
    student: Option<&mut Student>,
    behavior: Option<&Behavior>,
    justification: &str,
) -> Result<LedgerOutcome, ValidationError> {
    validate_justification(justification)?;

    let (student, behavior) = match (student, behavior) {
        (Some(student), Some(behavior)) => (student, behavior),
        _ => return Err(ValidationError::MissingSelection),
    };

    let previous_balance = student.points;
    let mut delta = behavior.points;
    let mut notice = None;

    if behavior.is_negative() && previous_balance + delta < 0 {
        delta = -previous_balance;
        notice = Some(ClampNotice {
            student_name: student.name.clone(),
            clamped_amount: previous_balance,
        });
    }

    student.points = previous_balance.saturating_add(delta);

    Ok(LedgerOutcome {
        student_id: student.id.clone(),
        behavior_id: behavior.id.clone(),
        previous_balance,
        new_balance: student.points,
        requested_delta: behavior.points,
        applied_delta: delta,
        notice,
    })
}

pub fn validate_justification(justification: &str) -> Result<(), ValidationError> {
    let actual = justification.trim().chars().count();
    if actual < MIN_JUSTIFICATION_CHARS {
        return Err(ValidationError::JustificationTooShort {
            min: MIN_JUSTIFICATION_CHARS,
            actual,
        });
    }
    Ok(())
}

// ============================================================================
// LEDGER ENTRY (audit record)
// ============================================================================

/// One recorded application, append-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub student_id: String,
    pub behavior_id: String,
    pub actor: String,
    pub justification: String,
    pub requested_delta: i64,
    pub applied_delta: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn from_outcome(outcome: &LedgerOutcome, actor: &str, justification: &str) -> Self {
        LedgerEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            student_id: outcome.student_id.clone(),
            behavior_id: outcome.behavior_id.clone(),
            actor: actor.to_string(),
            justification: justification.trim().to_string(),
            requested_delta: outcome.requested_delta,
            applied_delta: outcome.applied_delta,
            balance_before: outcome.previous_balance,
            balance_after: outcome.new_balance,
            recorded_at: Utc::now(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
