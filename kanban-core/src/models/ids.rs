//! Sequential `task-<n>` / `column-<n>` identifiers.

use std::fmt;

/// Kind of sequentially numbered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Task,
    Column,
}

impl IdKind {
    pub fn prefix(self) -> &'static str {
        match self {
            IdKind::Task => "task",
            IdKind::Column => "column",
        }
    }

    /// Format the id with sequence number `n`.
    pub fn format(self, n: u64) -> String {
        format!("{}-{}", self.prefix(), n)
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Sequence number of an id such as `task-12`. `None` when the id has no
/// numeric suffix.
pub fn sequence_of(id: &str) -> Option<u64> {
    let (_, suffix) = id.rsplit_once('-')?;
    suffix.parse().ok()
}

/// One more than the highest sequence number among `ids`, starting at 1.
pub fn next_sequence<'a>(ids: impl IntoIterator<Item = &'a str>) -> u64 {
    ids.into_iter()
        .filter_map(sequence_of)
        .max()
        .map_or(1, |max| max.saturating_add(1))
}
