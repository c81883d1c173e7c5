use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Content of a freshly added task.
pub const DEFAULT_TASK_CONTENT: &str = "Click to edit";

/// How new task and column ids are claimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdAllocation {
    /// Create the document only if the id is free, otherwise try the next
    /// number. Concurrent clients never claim the same id.
    #[default]
    Reserved,
    /// Merge-write the next id. Two clients that see the same maximum write
    /// the same id and the later content wins.
    Optimistic,
}

impl fmt::Display for IdAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdAllocation::Reserved => write!(f, "reserved"),
            IdAllocation::Optimistic => write!(f, "optimistic"),
        }
    }
}

impl FromStr for IdAllocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reserved" => Ok(IdAllocation::Reserved),
            "optimistic" => Ok(IdAllocation::Optimistic),
            _ => Err(format!(
                "Invalid id allocation '{}'. Valid options: reserved, optimistic",
                s
            )),
        }
    }
}

/// Behaviour switches for [`BoardSync`](super::BoardSync).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub id_allocation: IdAllocation,
    pub task_content: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            id_allocation: IdAllocation::default(),
            task_content: DEFAULT_TASK_CONTENT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_allocation_parse() {
        assert_eq!("Optimistic".parse::<IdAllocation>().unwrap(), IdAllocation::Optimistic);
        assert_eq!(IdAllocation::default().to_string(), "reserved");
        assert!("random".parse::<IdAllocation>().is_err());
    }
}
