// Built-in case scenarios and opposing counsel.

use std::collections::HashSet;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::scoring::StatTriple;

const BUILTIN_CATALOG: &str = include_str!("../data/catalog.json");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog has no {0}")]
    Empty(&'static str),
    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: String },
}

/// The player's opening posture for a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for StrategyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyLevel::Low => "low",
            StrategyLevel::Medium => "medium",
            StrategyLevel::High => "high",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefensiveStrategy {
    pub name: String,
    pub description: Vec<String>,
    pub risk_score: i32,
    pub risk: String,
    pub reward: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefensiveStrategies {
    pub low: DefensiveStrategy,
    pub medium: DefensiveStrategy,
    pub high: DefensiveStrategy,
}

impl DefensiveStrategies {
    pub fn get(&self, level: StrategyLevel) -> &DefensiveStrategy {
        match level {
            StrategyLevel::Low => &self.low,
            StrategyLevel::Medium => &self.medium,
            StrategyLevel::High => &self.high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioContext {
    pub key_issues: Vec<String>,
    pub stakeholders: Vec<String>,
    pub legal_domain: String,
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub plaintiff_position: String,
    pub defense_position: String,
    pub stakes: String,
    pub complexity: String,
    pub context: ScenarioContext,
    pub defensive_strategies: DefensiveStrategies,
    /// Prompt for the opening argument round.
    pub logic_prompt: String,
}

/// Opposing counsel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub pseudonym: String,
    pub image: String,
    pub quote: String,
    pub opening_statement: String,
    pub stats: StatTriple,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub scenarios: Vec<Scenario>,
    pub characters: Vec<Character>,
}

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.scenarios.is_empty() {
            return Err(CatalogError::Empty("scenarios"));
        }
        if self.characters.is_empty() {
            return Err(CatalogError::Empty("characters"));
        }

        let mut seen = HashSet::new();
        for s in &self.scenarios {
            if !seen.insert(s.id) {
                return Err(CatalogError::DuplicateId {
                    kind: "scenario",
                    id: s.id.to_string(),
                });
            }
        }
        let mut seen = HashSet::new();
        for c in &self.characters {
            if !seen.insert(c.id.as_str()) {
                return Err(CatalogError::DuplicateId {
                    kind: "character",
                    id: c.id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn scenario(&self, id: i64) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    pub fn character(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    /// Pick a random scenario and a random opponent for a new match.
    pub fn random_matchup<R: Rng + ?Sized>(&self, rng: &mut R) -> (&Scenario, &Character) {
        // validate() guarantees both lists are non-empty
        let scenario = self
            .scenarios
            .choose(rng)
            .unwrap_or(&self.scenarios[0]);
        let opponent = self
            .characters
            .choose(rng)
            .unwrap_or(&self.characters[0]);
        (scenario, opponent)
    }
}
