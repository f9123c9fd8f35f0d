use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const ID_FIELD: &str = "id";
pub const PROJECT_ID_FIELD: &str = "projectId";
pub const WORK_CONTEXT_ID_FIELD: &str = "workContextId";
pub const WORK_CONTEXT_TYPE_FIELD: &str = "workContextType";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkContextType {
    Project,
    Tag,
}

impl WorkContextType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "PROJECT",
            Self::Tag => "TAG",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReminderKind {
    Task,
    Note,
}

/// A reminder in the current shape, attached to a work context.
///
/// Only the fields the migration cares about are typed. Everything else,
/// including a `workContextId`/`workContextType` value that does not fit the
/// typed form, lands in `extra` and is written back exactly as it was read.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_context_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_context_type: Option<WorkContextType>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Reminder {
    /// Builds a reminder from a decoded JSON object. `id` must be a string;
    /// work-context fields are typed only when they parse.
    pub fn from_fields(mut fields: Map<String, Value>) -> Result<Self, String> {
        let id = match fields.remove(ID_FIELD) {
            Some(Value::String(id)) => id,
            Some(other) => return Err(format!("reminder id must be a string, got {other}")),
            None => return Err("reminder is missing `id`".to_string()),
        };
        let work_context_id = take_typed(&mut fields, WORK_CONTEXT_ID_FIELD);
        let work_context_type = take_typed(&mut fields, WORK_CONTEXT_TYPE_FIELD);

        Ok(Self {
            id,
            work_context_id,
            work_context_type,
            extra: fields.into_iter().collect(),
        })
    }

    pub fn title(&self) -> Option<&str> {
        self.extra.get("title").and_then(Value::as_str)
    }

    /// Epoch milliseconds.
    pub fn remind_at(&self) -> Option<i64> {
        self.extra.get("remindAt").and_then(Value::as_i64)
    }

    pub fn kind(&self) -> Option<ReminderKind> {
        self.extra
            .get("type")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn has_work_context(&self) -> bool {
        self.work_context_id.is_some() && self.work_context_type.is_some()
    }
}

impl<'de> Deserialize<'de> for Reminder {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_fields(fields).map_err(D::Error::custom)
    }
}

/// Removes `key` from `fields` only if its value parses as `T`.
fn take_typed<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str) -> Option<T> {
    let parsed = fields.get(key).and_then(|raw| T::deserialize(raw).ok())?;
    fields.remove(key);
    Some(parsed)
}

/// A reminder still keyed by `projectId`.
///
/// `projectId` is kept as raw JSON: whatever it holds becomes the
/// `workContextId`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyReminder {
    pub id: String,

    pub project_id: Value,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl LegacyReminder {
    /// True when the record carries current-shape fields next to `projectId`.
    /// Those are dropped on migration.
    pub fn has_stale_work_context(&self) -> bool {
        self.extra.contains_key(WORK_CONTEXT_ID_FIELD)
            || self.extra.contains_key(WORK_CONTEXT_TYPE_FIELD)
    }

    pub fn into_current(self) -> Reminder {
        let mut extra = self.extra;
        extra.remove(WORK_CONTEXT_ID_FIELD);
        extra.remove(WORK_CONTEXT_TYPE_FIELD);

        let work_context_id = match self.project_id {
            Value::String(id) => Some(id),
            other => {
                extra.insert(WORK_CONTEXT_ID_FIELD.to_string(), other);
                None
            }
        };

        Reminder {
            id: self.id,
            work_context_id,
            work_context_type: Some(WorkContextType::Project),
            extra,
        }
    }
}

/// A reminder as found on disk: either shape.
///
/// Decoding routes on the presence of `projectId`, not on its value, so an
/// empty string or `null` still counts as legacy.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum StoredReminder {
    Legacy(LegacyReminder),
    Current(Reminder),
}

impl StoredReminder {
    pub fn id(&self) -> &str {
        match self {
            Self::Legacy(legacy) => &legacy.id,
            Self::Current(current) => &current.id,
        }
    }

    pub fn needs_migration(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }

    pub fn into_current(self) -> Reminder {
        match self {
            Self::Legacy(legacy) => legacy.into_current(),
            Self::Current(current) => current,
        }
    }
}

impl From<Reminder> for StoredReminder {
    fn from(value: Reminder) -> Self {
        Self::Current(value)
    }
}

impl<'de> Deserialize<'de> for StoredReminder {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        if fields.contains_key(PROJECT_ID_FIELD) {
            LegacyReminder::deserialize(Value::Object(fields))
                .map(Self::Legacy)
                .map_err(D::Error::custom)
        } else {
            Reminder::from_fields(fields)
                .map(Self::Current)
                .map_err(D::Error::custom)
        }
    }
}
