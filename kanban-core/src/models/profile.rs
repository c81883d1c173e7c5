use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::store::{Document, FieldWrites, StoreResult};

/// Colour scheme preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(format!("Invalid theme '{}'. Valid options: light, dark", s)),
        }
    }
}

/// Per-user profile stored at `users/{uid}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub theme: Theme,
}

impl Profile {
    /// Profile created on first sign-in.
    pub fn from_display_name(display_name: &str) -> Self {
        Self {
            first_name: display_name.to_string(),
            last_name: String::new(),
            theme: Theme::Light,
        }
    }

    pub fn from_document(document: &Document) -> StoreResult<Self> {
        document.decode()
    }

    /// Merge write of every field.
    pub fn to_writes(&self) -> FieldWrites {
        FieldWrites::new()
            .set("firstName", self.first_name.as_str())
            .set("lastName", self.last_name.as_str())
            .set("theme", self.theme.to_string())
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "First name: {}", self.first_name)?;
        writeln!(f, "Last name:  {}", self.last_name)?;
        write!(f, "Theme:      {}", self.theme)
    }
}

/// Partial profile change; only the provided fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub theme: Option<Theme>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.theme.is_none()
    }

    pub fn to_writes(&self) -> FieldWrites {
        let mut writes = FieldWrites::new();
        if let Some(first_name) = &self.first_name {
            writes = writes.set("firstName", first_name.as_str());
        }
        if let Some(last_name) = &self.last_name {
            writes = writes.set("lastName", last_name.as_str());
        }
        if let Some(theme) = self.theme {
            writes = writes.set("theme", theme.to_string());
        }
        writes
    }
}
