use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Tunables;
use crate::error::XformerError;
use crate::guidebook::Session;
use crate::snapshot::GuideSnapshot;

/// Upstream timestamps look like `2017-08-31T20:18:28.038556+0000`.
pub const GUIDEBOOK_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// Where sessions without any location take place.
pub const FALLBACK_LOCATION: &str = "Discord";
pub const GUEST_OF_HONOR_ROLE: &str = "Guest of Honor";

const TRACK_CATEGORY: &str = "Track";
const ENVIRONMENT_CATEGORY: &str = "Environment";
const VIRTUAL_LABEL: &str = "Virtual Session";
const IN_PERSON_LABEL: &str = "In Person Session";

/// One schedule entry in the Watson front-end format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatsonSession {
    pub id: i64,
    #[serde(rename = "loc")]
    pub locations: Vec<String>,
    #[serde(rename = "title")]
    pub name: String,
    #[serde(rename = "desc")]
    pub description: String,
    #[serde(rename = "datetime")]
    pub start_time: String,
    #[serde(rename = "mins")]
    pub duration_minutes: i64,
    pub tags: Vec<Tag>,
    pub links: Links,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub people: Vec<Person>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    pub value: String,
    pub category: String,
}

impl Tag {
    fn new(category: &str, label: &str, value: String) -> Self {
        Self {
            label: label.to_string(),
            value,
            category: category.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Knobs for [`transform_sessions`] that come from configuration.
#[derive(Debug, Clone)]
pub struct TransformSettings {
    pub virtual_room_ids: Vec<i64>,
    pub deep_link_base: String,
}

impl From<&Tunables> for TransformSettings {
    fn from(tunables: &Tunables) -> Self {
        Self {
            virtual_room_ids: tunables.virtual_room_ids.clone(),
            deep_link_base: tunables.deep_link_base.clone(),
        }
    }
}

impl TransformSettings {
    fn deep_link(&self, session_id: i64) -> String {
        format!("{}item_id={}", self.deep_link_base, session_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Environment {
    is_virtual: bool,
    in_person: bool,
}

/// Build one Watson entry per session, sorted by start time.
///
/// Unknown references degrade to empty values; an unparseable timestamp
/// fails the whole run.
pub fn transform_sessions(
    snapshot: &GuideSnapshot,
    settings: &TransformSettings,
) -> Result<Vec<WatsonSession>, XformerError> {
    let mut watson = Vec::with_capacity(snapshot.sessions.len());
    for session in &snapshot.sessions {
        watson.push(transform_session(session, snapshot, settings)?);
    }
    watson.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    Ok(watson)
}

fn transform_session(
    session: &Session,
    snapshot: &GuideSnapshot,
    settings: &TransformSettings,
) -> Result<WatsonSession, XformerError> {
    let start = parse_guidebook_time(session, "start_time", &session.start_time)?;
    let finish = parse_guidebook_time(session, "end_time", &session.end_time)?;

    let locations = if session.locations.is_empty() {
        vec![FALLBACK_LOCATION.to_string()]
    } else {
        session
            .locations
            .iter()
            .map(|id| snapshot.location_name(*id).to_string())
            .collect()
    };

    let mut tags: Vec<Tag> = session
        .tracks
        .iter()
        .map(|id| {
            let name = snapshot.track_name(*id);
            Tag::new(TRACK_CATEGORY, name, slugify(&format!("track_{name}")))
        })
        .collect();

    let environment = classify_environment(session, settings);
    if environment.is_virtual {
        tags.push(Tag::new(ENVIRONMENT_CATEGORY, VIRTUAL_LABEL, slugify(VIRTUAL_LABEL)));
    }
    if environment.in_person {
        tags.push(Tag::new(ENVIRONMENT_CATEGORY, IN_PERSON_LABEL, slugify(IN_PERSON_LABEL)));
    }

    let deep_link = settings.deep_link(session.id);
    let links = Links {
        session: environment.is_virtual.then(|| deep_link.clone()),
        chat: Some(deep_link),
        ..Links::default()
    };

    Ok(WatsonSession {
        id: session.id,
        locations,
        name: session.name.clone(),
        description: session.description.clone(),
        start_time: format_watson_time(&start),
        duration_minutes: (finish - start).num_minutes(),
        tags,
        links,
        people: people_for(session.id, snapshot),
    })
}

fn parse_guidebook_time(
    session: &Session,
    field: &'static str,
    value: &str,
) -> Result<DateTime<FixedOffset>, XformerError> {
    DateTime::parse_from_str(value, GUIDEBOOK_TIME_FORMAT).map_err(|source| {
        XformerError::Timestamp {
            session_id: session.id,
            field,
            value: value.to_string(),
            source,
        }
    })
}

/// Fixed-width UTC with milliseconds, so string order is chronological order.
pub fn format_watson_time(time: &DateTime<FixedOffset>) -> String {
    time.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn classify_environment(session: &Session, settings: &TransformSettings) -> Environment {
    let mut environment = Environment::default();
    for id in &session.locations {
        if settings.virtual_room_ids.contains(id) {
            environment.is_virtual = true;
        } else {
            environment.in_person = true;
        }
    }

    if !environment.is_virtual && !environment.in_person {
        warn!(
            session_id = session.id,
            title = %session.name,
            "Session has no environment; treating it as in person"
        );
        environment.in_person = true;
    }
    environment
}

fn people_for(session_id: i64, snapshot: &GuideSnapshot) -> Vec<Person> {
    let Some(links) = snapshot.links_for(session_id) else {
        return Vec::new();
    };

    links
        .people()
        .map(|id| Person {
            id,
            name: snapshot.list_item_name(id).to_string(),
            role: snapshot
                .is_guest_of_honor(id)
                .then(|| GUEST_OF_HONOR_ROLE.to_string()),
        })
        .collect()
}

/// Lowercase, whitespace runs become `_`, anything else non-alphanumeric goes.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_separator = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            pending_separator = true;
            continue;
        }
        let lower = ch.to_ascii_lowercase();
        if !(lower.is_ascii_alphanumeric() || lower == '_') {
            continue;
        }
        if pending_separator && !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
        pending_separator = false;
        slug.push(lower);
    }
    slug
}
