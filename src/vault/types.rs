use serde::{Deserialize, Serialize};

// ============================================================================
// Records
// ============================================================================

/// Metadata for one stored secret. The value itself lives in the
/// secret value store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl KeyRecord {
    pub fn new(name: impl Into<String>, category: Option<String>) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }

    /// A record with no category.
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }
}

/// A named, ordered, collapsible grouping of keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub name: String,
    #[serde(default = "default_true")]
    pub expanded: bool,
    #[serde(default)]
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl CategoryRecord {
    /// A fresh, expanded category with no style hints.
    pub fn new(name: impl Into<String>, order: i64) -> Self {
        Self {
            name: name.into(),
            expanded: true,
            order,
            icon: None,
            color: None,
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// View State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    List,
    Grid,
}

impl std::str::FromStr for ViewMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(Self::List),
            "grid" => Ok(Self::Grid),
            _ => Err(format!("invalid view mode: {s}")),
        }
    }
}

/// Persisted display preference. Unrelated to secret data integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    #[serde(default)]
    pub mode: ViewMode,
    #[serde(default)]
    pub compact: bool,
}

/// Partial update for [`ViewState`]; only supplied fields change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ViewStatePatch {
    pub mode: Option<ViewMode>,
    pub compact: Option<bool>,
}

impl ViewState {
    /// Merge a patch into this state.
    pub fn apply(&mut self, patch: &ViewStatePatch) {
        if let Some(mode) = patch.mode {
            self.mode = mode;
        }
        if let Some(compact) = patch.compact {
            self.compact = compact;
        }
    }
}
