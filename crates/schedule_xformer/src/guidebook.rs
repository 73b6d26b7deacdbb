//! Typed records for the Guidebook open API collections.
//!
//! Pages arrive from [`crate::fetch`] as an untyped JSON array; each
//! collection is then decoded into its own record type here.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::error;

use crate::error::XformerError;

/// Source/target content type for schedule sessions.
pub const CONTENT_TYPE_SESSION: &str = "schedule.session";
/// Target content type for custom list items, which is how people are linked.
pub const CONTENT_TYPE_PERSON: &str = "custom_list.customlistitem";
/// Target content type for webviews, used for streams.
pub const CONTENT_TYPE_STREAM: &str = "uri_resource.webview";

/// The collections the transformer reads, in assembly order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Sessions,
    Locations,
    ScheduleTracks,
    CustomLists,
    CustomListItems,
    Links,
}

impl Resource {
    pub fn collection(self) -> &'static str {
        match self {
            Resource::Sessions => "sessions",
            Resource::Locations => "locations",
            Resource::ScheduleTracks => "schedule-tracks",
            Resource::CustomLists => "custom-lists",
            Resource::CustomListItems => "custom-list-items",
            Resource::Links => "links",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, rename = "description_html", deserialize_with = "null_as_default")]
    pub description: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub allow_rating: bool,
    #[serde(default, rename = "add_to_schedule_enabled")]
    pub add_to_schedule: bool,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rank: f64,
    #[serde(default)]
    pub moderator_notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub locations: Vec<i64>,
    #[serde(default, rename = "schedule_tracks", deserialize_with = "null_as_default")]
    pub tracks: Vec<i64>,
}

/// Shape shared by locations and schedule tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomList {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Filled in from the item side during assembly.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub items: BTreeSet<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default, rename = "description_html")]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_lists: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRelation {
    pub id: i64,
    #[serde(default, rename = "title", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "source_content_type")]
    pub source_type: String,
    #[serde(rename = "source_object_id")]
    pub source_id: i64,
    #[serde(rename = "target_content_type")]
    pub target_type: String,
    #[serde(rename = "target_object_id")]
    pub target_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rank: f64,
    #[serde(default, rename = "category")]
    pub category_id: Option<i64>,
}

/// Guidebook sends `null` for blank text and numbers; read those as empty.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl LinkRelation {
    pub fn is_from_session(&self) -> bool {
        self.source_type == CONTENT_TYPE_SESSION
    }
}

/// Decode a fetched collection buffer into typed records.
///
/// Any mismatch fails the whole collection; the offending payload is logged
/// and kept on the error.
pub fn decode_records<T: DeserializeOwned>(
    resource: Resource,
    raw: &[u8],
) -> Result<Vec<T>, XformerError> {
    serde_json::from_slice(raw).map_err(|source| {
        let payload = String::from_utf8_lossy(raw).into_owned();
        error!(
            collection = resource.collection(),
            payload = %payload,
            "Undecodable Guidebook payload"
        );
        XformerError::Decode {
            resource: resource.collection().to_string(),
            payload,
            source,
        }
    })
}
