// ⭐ Behavior Catalog - fixed list of nameable actions
//
// Polarity is never stored independently of the point delta: it is derived
// from the sign of `points` when a behavior is built, and any externally
// supplied polarity must agree with it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Behaviors at or below this delta need an explicit confirmation step
pub const SEVERE_THRESHOLD: i64 = -100;

// ============================================================================
// POLARITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    /// Polarity implied by a point delta (None for zero)
    pub fn from_points(points: i64) -> Option<Polarity> {
        match points {
            p if p > 0 => Some(Polarity::Positive),
            p if p < 0 => Some(Polarity::Negative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Positive => "positive",
            Polarity::Negative => "negative",
        }
    }

    pub fn parse(value: &str) -> Option<Polarity> {
        match value.trim().to_lowercase().as_str() {
            "positive" | "+" => Some(Polarity::Positive),
            "negative" | "-" => Some(Polarity::Negative),
            _ => None,
        }
    }
}

// ============================================================================
// CATALOG ERRORS
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("behavior {id}: point delta must be non-zero")]
    ZeroDelta { id: String },

    #[error("behavior {id}: declared polarity {declared} contradicts {points} points")]
    PolarityMismatch {
        id: String,
        declared: &'static str,
        points: i64,
    },

    #[error("behavior {id}: name must not be empty")]
    EmptyName { id: String },

    #[error("behavior id must not be empty")]
    EmptyId,

    #[error("duplicate behavior id: {0}")]
    DuplicateId(String),
}

// ============================================================================
// BEHAVIOR
// ============================================================================

/// Catalog entry as written in a JSON catalog file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub points: i64,
    /// Optional; checked against the sign of `points`
    #[serde(default)]
    pub polarity: Option<Polarity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Behavior {
    pub id: String,
    pub name: String,
    pub description: String,
    pub points: i64,
    pub polarity: Polarity,
}

impl Behavior {
    /// Build a behavior, deriving polarity from the sign of `points`
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        points: i64,
    ) -> Result<Self, CatalogError> {
        Behavior::from_definition(BehaviorDefinition {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            points,
            polarity: None,
        })
    }

    pub fn from_definition(def: BehaviorDefinition) -> Result<Self, CatalogError> {
        if def.id.trim().is_empty() {
            return Err(CatalogError::EmptyId);
        }
        if def.name.trim().is_empty() {
            return Err(CatalogError::EmptyName { id: def.id });
        }

        let derived = Polarity::from_points(def.points)
            .ok_or_else(|| CatalogError::ZeroDelta { id: def.id.clone() })?;

        if let Some(declared) = def.polarity {
            if declared != derived {
                return Err(CatalogError::PolarityMismatch {
                    id: def.id,
                    declared: declared.as_str(),
                    points: def.points,
                });
            }
        }

        Ok(Behavior {
            id: def.id,
            name: def.name,
            description: def.description,
            points: def.points,
            polarity: derived,
        })
    }

    /// Invariant check: stored polarity agrees with the delta
    pub fn is_consistent(&self) -> bool {
        Polarity::from_points(self.points) == Some(self.polarity)
    }

    pub fn is_negative(&self) -> bool {
        self.polarity == Polarity::Negative
    }

    /// Severe behaviors require caller confirmation before applying
    pub fn is_severe(&self) -> bool {
        self.points <= SEVERE_THRESHOLD
    }
}

// ============================================================================
// BEHAVIOR CATALOG
// ============================================================================

/// Immutable catalog, built once at startup
#[derive(Debug, Clone)]
pub struct BehaviorCatalog {
    behaviors: Vec<Behavior>,
}

impl BehaviorCatalog {
    /// The built-in classroom catalog
    pub fn builtin() -> Self {
        let definitions = [
            ("b1", "Gentileza", "Mostrou gentileza excepcional com um colega.", 20),
            ("b2", "Ajudar um Colega", "Ajudou um colega ou professor sem ser solicitado.", 15),
            ("b3", "Respeito", "Demonstrou respeito pelas opiniões e propriedades dos outros.", 10),
            ("b4", "Colaboração", "Trabalhou de forma eficaz e inclusiva em grupo.", 15),
            ("b5", "Empatia", "Mostrou compreensão e compaixão pelos sentimentos de alguém.", 20),
            ("b6", "Atitude Positiva", "Manteve uma atitude positiva e encorajou os outros.", 10),
            ("n1", "Infração Leve", "Ex: usar palavrão.", -20),
            ("n2", "Infração Média", "Ex: empurrar um colega.", -50),
            ("n3", "Infração Grave", "Ex: bullying.", -100),
        ];

        let behaviors = definitions
            .into_iter()
            .map(|(id, name, description, points)| Behavior {
                id: id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                points,
                polarity: if points > 0 { Polarity::Positive } else { Polarity::Negative },
            })
            .collect();

        BehaviorCatalog { behaviors }
    }

    /// Load and validate a catalog from a JSON array of definitions
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read behavior catalog: {:?}", path.as_ref()))?;

        let definitions: Vec<BehaviorDefinition> =
            serde_json::from_str(&content).context("Failed to parse behavior catalog JSON")?;

        let catalog = BehaviorCatalog::from_definitions(definitions)
            .with_context(|| format!("Invalid behavior catalog: {:?}", path.as_ref()))?;

        Ok(catalog)
    }

    pub fn from_definitions(definitions: Vec<BehaviorDefinition>) -> Result<Self, CatalogError> {
        let behaviors = definitions
            .into_iter()
            .map(Behavior::from_definition)
            .collect::<Result<Vec<_>, _>>()?;

        BehaviorCatalog::from_behaviors(behaviors)
    }

    pub fn from_behaviors(behaviors: Vec<Behavior>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();

        for behavior in &behaviors {
            if !behavior.is_consistent() {
                return Err(match behavior.points {
                    0 => CatalogError::ZeroDelta { id: behavior.id.clone() },
                    points => CatalogError::PolarityMismatch {
                        id: behavior.id.clone(),
                        declared: behavior.polarity.as_str(),
                        points,
                    },
                });
            }
            if !seen.insert(behavior.id.as_str()) {
                return Err(CatalogError::DuplicateId(behavior.id.clone()));
            }
        }

        Ok(BehaviorCatalog { behaviors })
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Behavior> {
        self.behaviors.iter().find(|b| b.id == id)
    }

    pub fn all(&self) -> &[Behavior] {
        &self.behaviors
    }

    pub fn by_polarity(&self, polarity: Polarity) -> Vec<&Behavior> {
        self.behaviors
            .iter()
            .filter(|b| b.polarity == polarity)
            .collect()
    }

    pub fn positive(&self) -> Vec<&Behavior> {
        self.by_polarity(Polarity::Positive)
    }

    pub fn negative(&self) -> Vec<&Behavior> {
        self.by_polarity(Polarity::Negative)
    }

    pub fn count(&self) -> usize {
        self.behaviors.len()
    }
}

impl Default for BehaviorCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// TESTS
// ============================================================================
