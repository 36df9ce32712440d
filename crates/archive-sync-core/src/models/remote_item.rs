//! Remote tree item model

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decoded metadata values keyed by metadata name.
pub type Metadata = BTreeMap<String, Value>;

/// Kind of node in the remote tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Folder,
    File,
}

impl ItemKind {
    /// OData type name used by the remote listing filter.
    #[must_use]
    pub const fn odata_type(self) -> &'static str {
        match self {
            Self::Folder => "ShareFile.Api.Models.Folder",
            Self::File => "ShareFile.Api.Models.File",
        }
    }

    /// Map an OData type name back to a kind.
    #[must_use]
    pub fn from_odata_type(value: &str) -> Option<Self> {
        match value {
            "ShareFile.Api.Models.Folder" => Some(Self::Folder),
            "ShareFile.Api.Models.File" => Some(Self::File),
            _ => None,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Folder => f.write_str("folder"),
            Self::File => f.write_str("file"),
        }
    }
}

/// Snapshot of a remote item at fetch time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Remote item identifier
    pub id: String,
    /// Display name (folder or file name)
    pub name: String,
    /// Folder or file
    pub kind: ItemKind,
    /// Parent folder identifier, when known
    pub parent_id: Option<String>,
    /// Creation time on the remote store
    pub created_at: DateTime<Utc>,
    /// Last change time (progeny edit time for folders, creation time for files)
    pub last_changed_at: DateTime<Utc>,
    /// Decoded metadata; empty until fetched
    #[serde(default)]
    pub metadata: Metadata,
}

impl RemoteItem {
    /// Whether the item changed at or after `since`.
    #[must_use]
    pub fn changed_since(&self, since: DateTime<Utc>) -> bool {
        self.last_changed_at >= since
    }

    /// Resolve correlation fields carried in the ticket metadata.
    #[must_use]
    pub fn correlation(&self) -> Correlation {
        Correlation::from_metadata(&self.metadata)
    }

    /// JSON context used when rendering title templates.
    ///
    /// Metadata values are merged in next to `name`; `name` always wins.
    #[must_use]
    pub fn template_context(&self) -> Value {
        let mut item = serde_json::Map::new();
        for (key, value) in &self.metadata {
            item.insert(key.clone(), value.clone());
        }
        item.insert("name".to_string(), Value::String(self.name.clone()));
        item.insert("id".to_string(), Value::String(self.id.clone()));

        let mut root = serde_json::Map::new();
        root.insert("item".to_string(), Value::Object(item));
        Value::Object(root)
    }

    /// Compact snapshot for failure context (metadata included, no content).
    #[must_use]
    pub fn snapshot(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "kind": self.kind,
            "parent_id": self.parent_id,
            "last_changed_at": self.last_changed_at.to_rfc3339(),
            "metadata": self.metadata,
        })
    }
}

const TICKET_DATA_KEY: &str = "ticket_data";

/// Correlation fields extracted from remote metadata at the ingestion boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    /// Department used to derive the archive organisation reference
    pub department_id: Option<String>,
    /// Sequence number of an existing archive case file
    pub case_sequence_number: Option<String>,
}

impl Correlation {
    /// Extract correlation fields from `ticket_data` metadata.
    ///
    /// Numbers and strings are both accepted; empty strings count as absent.
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let Some(ticket) = metadata.get(TICKET_DATA_KEY) else {
            return Self::default();
        };

        Self {
            department_id: scalar_text(ticket.get("department_id")),
            case_sequence_number: scalar_text(ticket.get("edoc_case_id")),
        }
    }

    /// First department id found among `items`, in order.
    pub fn first_department<'a>(items: impl IntoIterator<Item = &'a RemoteItem>) -> Option<String> {
        items
            .into_iter()
            .find_map(|item| item.correlation().department_id)
    }

    /// First case sequence number found among `items`, in order.
    pub fn first_case_sequence_number<'a>(
        items: impl IntoIterator<Item = &'a RemoteItem>,
    ) -> Option<String> {
        items
            .into_iter()
            .find_map(|item| item.correlation().case_sequence_number)
    }
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
