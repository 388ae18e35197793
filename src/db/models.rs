use std::collections::BTreeMap;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Branch served when a request does not name one. Also the only branch
/// included in the unfiltered story listing.
pub const DEFAULT_BRANCH: &str = "branch_1";

/// A branching interactive story stored in the `stories` collection.
///
/// Stories are stored without schema checks, so reading never fails: a
/// field whose stored value does not fit its typed slot is kept in `extra`
/// under its own key and returned verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Document")]
pub struct Story {
    /// Store-generated identifier, rendered as a hex string in JSON.
    #[serde(
        rename = "_id",
        serialize_with = "serialize_object_id_hex",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<ObjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    /// Branch name (e.g. `branch_1`) to branch content.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub layers: BTreeMap<String, Branch>,
    #[serde(flatten)]
    pub extra: Document,
}

impl From<Document> for Story {
    fn from(mut doc: Document) -> Self {
        let id = match doc.remove("_id") {
            Some(Bson::ObjectId(oid)) => Some(oid),
            Some(Bson::String(hex)) => match ObjectId::parse_str(&hex) {
                Ok(oid) => Some(oid),
                Err(_) => {
                    doc.insert("_id", hex);
                    None
                }
            },
            Some(other) => {
                doc.insert("_id", other);
                None
            }
            None => None,
        };

        let title = take_text(&mut doc, "title");
        let author = take_text(&mut doc, "author");
        let author_email = take_text(&mut doc, "author_email");

        let layers = match doc.remove("layers") {
            Some(Bson::Document(layers)) => layers
                .into_iter()
                .map(|(name, value)| (name, Branch::from(value)))
                .collect(),
            Some(other) => {
                doc.insert("layers", other);
                BTreeMap::new()
            }
            None => BTreeMap::new(),
        };

        Self {
            id,
            title,
            author,
            author_email,
            layers,
            extra: doc,
        }
    }
}

fn take_text(doc: &mut Document, key: &str) -> Option<String> {
    match doc.remove(key) {
        Some(Bson::String(text)) => Some(text),
        Some(other) => {
            doc.insert(key, other);
            None
        }
        None => None,
    }
}

/// One narrative branch of a story.
///
/// `views` and `time_spent` are absent in the store until the first access,
/// and read as zero until then. A stored counter that is not a usable
/// number stays in `content` as-is and the typed counter reads as zero.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Bson")]
pub struct Branch {
    pub views: i64,
    pub time_spent: f64,
    /// Narrative content, opaque to this service.
    pub content: Document,
    /// The stored value when the branch is not a sub-document.
    pub opaque: Option<Bson>,
}

impl From<Bson> for Branch {
    fn from(value: Bson) -> Self {
        let mut content = match value {
            Bson::Document(content) => content,
            other => {
                return Self {
                    opaque: Some(other),
                    ..Default::default()
                }
            }
        };

        let views = take_counter(&mut content, "views", whole_count).unwrap_or(0);
        let time_spent = take_counter(&mut content, "timeSpent", duration).unwrap_or(0.0);

        Self {
            views,
            time_spent,
            content,
            opaque: None,
        }
    }
}

impl Serialize for Branch {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if let Some(value) = &self.opaque {
            return value.serialize(serializer);
        }

        let mut map = serializer.serialize_map(None)?;
        if !self.content.contains_key("views") {
            map.serialize_entry("views", &self.views)?;
        }
        if !self.content.contains_key("timeSpent") {
            map.serialize_entry("timeSpent", &self.time_spent)?;
        }
        for (key, value) in &self.content {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Removes `key` from `content` when `parse` accepts its value.
fn take_counter<T>(
    content: &mut Document,
    key: &str,
    parse: fn(&Bson) -> Option<T>,
) -> Option<T> {
    let parsed = content.get(key).and_then(parse)?;
    content.remove(key);
    Some(parsed)
}

/// A view count: any BSON integer, or a double with no fractional part.
/// `2.5` views is not a count and is left untouched.
fn whole_count(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some((*v).into()),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
            Some(*v as i64)
        }
        Bson::Null => Some(0),
        _ => None,
    }
}

fn duration(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some((*v).into()),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        Bson::Null => Some(0.0),
        _ => None,
    }
}

/// Acknowledgment returned after a story has been inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertAck {
    pub acknowledged: bool,
    /// Hex form of the generated identifier.
    pub inserted_id: String,
}

/// Request body for `POST /api/stories/{id}/updateTime`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTimeRequest {
    pub branch_name: String,
    /// Delta added to the branch's accumulated time.
    pub time_spent: f64,
}

/// Acknowledgment returned after time spent has been accumulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSpentAck {
    pub acknowledged: bool,
    pub branch_name: String,
    /// Accumulated total after the update.
    pub time_spent: f64,
}

fn serialize_object_id_hex<S>(id: &Option<ObjectId>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match id {
        Some(oid) => serializer.serialize_str(&oid.to_hex()),
        None => serializer.serialize_none(),
    }
}
