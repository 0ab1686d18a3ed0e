//! REPL-submitted instructions routed into the work loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of guidance an instruction carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
    #[default]
    UserInput,
    PlanUpdate,
    Constraint,
    Clarification,
    Acceptance,
}

impl std::fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserInput => write!(f, "user_input"),
            Self::PlanUpdate => write!(f, "plan_update"),
            Self::Constraint => write!(f, "constraint"),
            Self::Clarification => write!(f, "clarification"),
            Self::Acceptance => write!(f, "acceptance"),
        }
    }
}

impl std::str::FromStr for InstructionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user_input" => Ok(Self::UserInput),
            "plan_update" => Ok(Self::PlanUpdate),
            "constraint" => Ok(Self::Constraint),
            "clarification" => Ok(Self::Clarification),
            "acceptance" => Ok(Self::Acceptance),
            _ => Err(format!("Unknown instruction type: {}", s)),
        }
    }
}

/// Instruction urgency; lower numeric value drains first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstructionPriority {
    Critical = 1,
    High = 2,
    #[default]
    Normal = 3,
    Low = 4,
}

impl std::fmt::Display for InstructionPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for InstructionPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(format!("Unknown instruction priority: {}", s)),
        }
    }
}

/// One queued instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub content: String,
    pub kind: InstructionKind,
    pub priority: InstructionPriority,
    pub timestamp: DateTime<Utc>,
}
