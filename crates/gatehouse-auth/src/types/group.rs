use serde::{Deserialize, Serialize};

/// A named set of subjects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Generated on create when empty.
    pub id: String,
    pub members: Vec<String>,
}

impl Group {
    #[must_use]
    pub fn new(id: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            id: id.into(),
            members,
        }
    }
}
