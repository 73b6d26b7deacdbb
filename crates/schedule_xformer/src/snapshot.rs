use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::XformerError;
use crate::fetch::{GuideFetcher, Transport};
use crate::guidebook::{
    CONTENT_TYPE_PERSON, CONTENT_TYPE_STREAM, CustomList, LinkRelation, ListItem, NamedEntity,
    Resource, Session, decode_records,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionLink {
    pub target_type: String,
    pub target_id: i64,
}

/// Everything a single session links to, keyed by target id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionLinks {
    pub session_id: i64,
    pub targets: BTreeMap<i64, SessionLink>,
}

impl SessionLinks {
    pub fn people(&self) -> impl Iterator<Item = i64> + '_ {
        self.targets_of(CONTENT_TYPE_PERSON)
    }

    pub fn streams(&self) -> impl Iterator<Item = i64> + '_ {
        self.targets_of(CONTENT_TYPE_STREAM)
    }

    fn targets_of<'a>(&'a self, target_type: &'a str) -> impl Iterator<Item = i64> + 'a {
        self.targets
            .values()
            .filter(move |link| link.target_type == target_type)
            .map(|link| link.target_id)
    }
}

/// Everything loaded from one guide in a single run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GuideSnapshot {
    pub sessions: Vec<Session>,
    pub locations: BTreeMap<i64, String>,
    pub tracks: BTreeMap<i64, String>,
    pub custom_lists: BTreeMap<i64, CustomList>,
    pub custom_list_items: BTreeMap<i64, ListItem>,
    pub session_links: BTreeMap<i64, SessionLinks>,
    pub other_links: BTreeMap<i64, Vec<LinkRelation>>,
    pub guests_of_honor: BTreeMap<i64, String>,
}

impl GuideSnapshot {
    /// Unknown ids resolve to an empty name; upstream retires ids without
    /// cleaning up references to them.
    pub fn location_name(&self, id: i64) -> &str {
        self.locations.get(&id).map(String::as_str).unwrap_or_default()
    }

    pub fn track_name(&self, id: i64) -> &str {
        self.tracks.get(&id).map(String::as_str).unwrap_or_default()
    }

    pub fn list_item_name(&self, id: i64) -> &str {
        self.custom_list_items
            .get(&id)
            .map(|item| item.name.as_str())
            .unwrap_or_default()
    }

    pub fn is_guest_of_honor(&self, id: i64) -> bool {
        self.guests_of_honor.contains_key(&id)
    }

    pub fn links_for(&self, session_id: i64) -> Option<&SessionLinks> {
        self.session_links.get(&session_id)
    }
}

/// Fetch every collection in dependency order and build the lookup indexes.
///
/// Any failure aborts assembly; no partial snapshot is returned.
pub fn assemble_snapshot<T: Transport>(
    fetcher: &mut GuideFetcher<T>,
    guests_of_honor_list_id: i64,
) -> Result<GuideSnapshot, XformerError> {
    let sessions: Vec<Session> =
        fetch_resource(fetcher, Resource::Sessions).map_err(|err| err.in_stage("sessions"))?;

    let locations = fetch_resource(fetcher, Resource::Locations)
        .map(index_names)
        .map_err(|err| err.in_stage("session locations"))?;

    let tracks = fetch_resource(fetcher, Resource::ScheduleTracks)
        .map(index_names)
        .map_err(|err| err.in_stage("schedule tracks"))?;

    let (custom_lists, custom_list_items) =
        fetch_lists(fetcher).map_err(|err| err.in_stage("lists and list items"))?;

    let (session_links, other_links) = fetch_resource(fetcher, Resource::Links)
        .map(partition_links)
        .map_err(|err| err.in_stage("session links"))?;

    let guests_of_honor =
        resolve_guests_of_honor(guests_of_honor_list_id, &custom_lists, &custom_list_items);

    info!(
        sessions = sessions.len(),
        locations = locations.len(),
        tracks = tracks.len(),
        lists = custom_lists.len(),
        list_items = custom_list_items.len(),
        linked_sessions = session_links.len(),
        guests_of_honor = guests_of_honor.len(),
        requests = fetcher.successful_requests(),
        "Guidebook snapshot assembled"
    );

    Ok(GuideSnapshot {
        sessions,
        locations,
        tracks,
        custom_lists,
        custom_list_items,
        session_links,
        other_links,
        guests_of_honor,
    })
}

fn fetch_resource<T: Transport, R: DeserializeOwned>(
    fetcher: &mut GuideFetcher<T>,
    resource: Resource,
) -> Result<Vec<R>, XformerError> {
    let raw = fetcher.fetch_collection(resource.collection())?;
    decode_records(resource, &raw)
}

fn fetch_lists<T: Transport>(
    fetcher: &mut GuideFetcher<T>,
) -> Result<(BTreeMap<i64, CustomList>, BTreeMap<i64, ListItem>), XformerError> {
    let lists: Vec<CustomList> = fetch_resource(fetcher, Resource::CustomLists)?;
    let items: Vec<ListItem> = fetch_resource(fetcher, Resource::CustomListItems)?;

    let items: BTreeMap<i64, ListItem> = items.into_iter().map(|item| (item.id, item)).collect();
    let lists = invert_memberships(lists, &items);
    Ok((lists, items))
}

pub fn index_names(entities: Vec<NamedEntity>) -> BTreeMap<i64, String> {
    entities
        .into_iter()
        .map(|entity| (entity.id, entity.name))
        .collect()
}

/// Populate each list's members from the item side, which is the only place
/// the API reports membership.
pub fn invert_memberships(
    lists: Vec<CustomList>,
    items: &BTreeMap<i64, ListItem>,
) -> BTreeMap<i64, CustomList> {
    let mut by_id: BTreeMap<i64, CustomList> =
        lists.into_iter().map(|list| (list.id, list)).collect();

    for item in items.values() {
        for list_id in &item.custom_lists {
            let list = by_id.entry(*list_id).or_insert_with(|| {
                debug!(list_id, item_id = item.id, "Item references an unknown custom list");
                CustomList {
                    id: *list_id,
                    ..CustomList::default()
                }
            });
            list.items.insert(item.id);
        }
    }

    by_id
}

/// Split link relations into per-session targets and everything else.
///
/// A later edge to the same target of the same session replaces the earlier one.
pub fn partition_links(
    links: Vec<LinkRelation>,
) -> (BTreeMap<i64, SessionLinks>, BTreeMap<i64, Vec<LinkRelation>>) {
    let mut session_links: BTreeMap<i64, SessionLinks> = BTreeMap::new();
    let mut other_links: BTreeMap<i64, Vec<LinkRelation>> = BTreeMap::new();

    for link in links {
        if link.is_from_session() {
            let entry = session_links
                .entry(link.source_id)
                .or_insert_with(|| SessionLinks {
                    session_id: link.source_id,
                    targets: BTreeMap::new(),
                });
            entry.targets.insert(
                link.target_id,
                SessionLink {
                    target_type: link.target_type,
                    target_id: link.target_id,
                },
            );
        } else {
            other_links.entry(link.source_id).or_default().push(link);
        }
    }

    let streams: usize = session_links.values().map(|links| links.streams().count()).sum();
    debug!(
        linked_sessions = session_links.len(),
        streams,
        "Partitioned session links"
    );

    (session_links, other_links)
}

pub fn resolve_guests_of_honor(
    list_id: i64,
    lists: &BTreeMap<i64, CustomList>,
    items: &BTreeMap<i64, ListItem>,
) -> BTreeMap<i64, String> {
    let Some(list) = lists.get(&list_id) else {
        debug!(list_id, "Guests of honor list not present in guide");
        return BTreeMap::new();
    };

    list.items
        .iter()
        .map(|id| {
            let name = items.get(id).map(|item| item.name.clone()).unwrap_or_default();
            (*id, name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guidebook::CONTENT_TYPE_SESSION;

    fn item(id: i64, name: &str, lists: &[i64]) -> ListItem {
        ListItem {
            id,
            name: name.to_string(),
            custom_lists: lists.to_vec(),
            ..ListItem::default()
        }
    }

    fn list(id: i64, name: &str) -> CustomList {
        CustomList {
            id,
            name: name.to_string(),
            ..CustomList::default()
        }
    }

    fn link(source_type: &str, source_id: i64, target_type: &str, target_id: i64) -> LinkRelation {
        LinkRelation {
            id: source_id * 1_000 + target_id,
            name: String::new(),
            source_type: source_type.to_string(),
            source_id,
            target_type: target_type.to_string(),
            target_id,
            rank: 0.0,
            category_id: None,
        }
    }

    fn item_map(items: Vec<ListItem>) -> BTreeMap<i64, ListItem> {
        items.into_iter().map(|item| (item.id, item)).collect()
    }

    #[test]
    fn membership_comes_from_item_side_regardless_of_order() {
        let forward = item_map(vec![item(1, "A", &[10]), item(2, "B", &[10, 11])]);
        let reversed = item_map(vec![item(2, "B", &[11, 10]), item(1, "A", &[10])]);

        for items in [forward, reversed] {
            let lists = invert_memberships(vec![list(10, "Panelists"), list(11, "Hosts")], &items);
            assert_eq!(lists[&10].items.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
            assert_eq!(lists[&11].items.iter().copied().collect::<Vec<_>>(), vec![2]);
        }
    }

    #[test]
    fn unknown_list_gets_placeholder() {
        let items = item_map(vec![item(5, "Orphan", &[99])]);
        let lists = invert_memberships(Vec::new(), &items);
        assert_eq!(lists[&99].id, 99);
        assert!(lists[&99].name.is_empty());
        assert!(lists[&99].items.contains(&5));
    }

    #[test]
    fn partitions_session_links_last_write_wins() {
        let links = vec![
            link(CONTENT_TYPE_SESSION, 100, CONTENT_TYPE_STREAM, 7),
            link(CONTENT_TYPE_SESSION, 100, CONTENT_TYPE_PERSON, 900),
            link(CONTENT_TYPE_SESSION, 100, CONTENT_TYPE_PERSON, 7),
            link("custom_list.customlistitem", 900, CONTENT_TYPE_SESSION, 100),
        ];

        let (sessions, others) = partition_links(links);
        let linked = &sessions[&100];
        assert_eq!(linked.targets.len(), 2);
        assert_eq!(linked.targets[&7].target_type, CONTENT_TYPE_PERSON);
        assert_eq!(linked.people().collect::<Vec<_>>(), vec![7, 900]);
        assert_eq!(linked.streams().count(), 0);
        assert_eq!(others[&900].len(), 1);
    }

    #[test]
    fn stream_targets_are_kept_apart_from_people() {
        let links = vec![
            link(CONTENT_TYPE_SESSION, 100, CONTENT_TYPE_STREAM, 4000),
            link(CONTENT_TYPE_SESSION, 100, CONTENT_TYPE_PERSON, 900),
            link(CONTENT_TYPE_SESSION, 101, CONTENT_TYPE_STREAM, 4001),
        ];

        let (sessions, _) = partition_links(links);
        assert_eq!(sessions[&100].streams().collect::<Vec<_>>(), vec![4000]);
        assert_eq!(sessions[&100].people().collect::<Vec<_>>(), vec![900]);
        assert_eq!(sessions[&101].people().count(), 0);
        let streams: usize = sessions.values().map(|l| l.streams().count()).sum();
        assert_eq!(streams, 2);
    }

    #[test]
    fn guests_of_honor_resolve_through_items() {
        let items = item_map(vec![item(1, "Author", &[77]), item(2, "Artist", &[77, 3])]);
        let lists = invert_memberships(vec![list(77, "Guests of Honor")], &items);

        let guests = resolve_guests_of_honor(77, &lists, &items);
        assert_eq!(guests.len(), 2);
        assert_eq!(guests[&1], "Author");
        assert_eq!(guests[&2], "Artist");

        assert!(resolve_guests_of_honor(12345, &lists, &items).is_empty());
    }

    #[test]
    fn tolerant_lookups_yield_empty_names() {
        let mut snapshot = GuideSnapshot::default();
        snapshot.locations.insert(1, "Main Hall".to_string());
        snapshot.tracks.insert(2, "Gaming".to_string());

        assert_eq!(snapshot.location_name(1), "Main Hall");
        assert_eq!(snapshot.location_name(404), "");
        assert_eq!(snapshot.track_name(2), "Gaming");
        assert_eq!(snapshot.track_name(404), "");
        assert_eq!(snapshot.list_item_name(404), "");
        assert!(!snapshot.is_guest_of_honor(404));
        assert!(snapshot.links_for(404).is_none());
    }
}
