use chaingraph_bus::{BusContext, HandlerResult};
use chaingraph_core::{
    Anchor, Direction, EntityAttributes, EntityKey, EntityPayload, EntityType, FetchError,
    FetchResult, KeyspaceStats, Neighbor, NeighborSearchResult, NeighborsPage, SearchPath,
    StatusMessage, Tag, UndoState,
};
use serde_json::Value;
use std::future::Future;
use tracing::{debug, error, info, warn};

use crate::degree::{self, record_neighbors};
use crate::error::{ExplorerError, Result};
use crate::message::{DegreeContext, FailedRequest, FocusLink, Message, NeighborSearch};
use crate::orchestrator;
use crate::session::Session;

pub(crate) type Ctx<'a> = BusContext<'a, Message>;

/// Spawns `request` and routes a failure to `fetchError`.
pub(crate) fn fetch<T, F, S>(ctx: &Ctx<'_>, request: F, on_success: S, attempted: FailedRequest)
where
    T: Send + 'static,
    F: Future<Output = FetchResult<T>> + Send + 'static,
    S: FnOnce(T) -> Message + Send + 'static,
{
    ctx.map_result(request, on_success, move |error| Message::FetchError {
        request: attempted,
        error,
    });
}

/// Entry point subscribed to every message name.
pub fn handle(session: &mut Session, message: Message, ctx: &mut Ctx<'_>) -> HandlerResult {
    dispatch(session, message, ctx).map_err(Into::into)
}

fn dispatch(session: &mut Session, message: Message, ctx: &mut Ctx<'_>) -> Result<()> {
    match message {
        Message::Stats => {
            load_stats(session, ctx);
            Ok(())
        }
        Message::ReceiveStats(stats) => {
            receive_stats(session, stats);
            Ok(())
        }
        Message::Search { keyspaces, term } => {
            search(session, ctx, keyspaces, term);
            Ok(())
        }
        Message::SearchResult {
            keyspace,
            term,
            result,
        } => {
            session.view.on_search_result(&keyspace, &term, &result);
            Ok(())
        }
        Message::ClickSearchResult { key } => {
            click_search_result(session, ctx, key);
            Ok(())
        }
        Message::SelectNeighbor {
            focus,
            direction,
            neighbor,
            anchor,
        } => select_neighbor(session, ctx, focus, direction, neighbor, anchor),
        Message::ResultNode {
            focus,
            anchor,
            result,
        } => result_node(session, ctx, focus, anchor, result),
        Message::AddNode { key, anchor } => orchestrator::add_node(session, ctx, key, anchor),
        Message::AddNodeCont { context, result } => {
            orchestrator::advance(session, ctx, context, result)
        }
        Message::LoadDegree { context, result } => {
            degree::load_degree(session, ctx, context, result)
        }
        Message::ResultTags { key, tags } => {
            result_tags(session, key, tags);
            Ok(())
        }
        Message::SelectNode(key) => select_node(session, key),
        Message::LoadEgonet {
            key,
            direction,
            limit,
        } => {
            load_egonet(session, ctx, key, direction, limit);
            Ok(())
        }
        Message::ResultEgonet {
            key,
            direction,
            page,
        } => result_egonet(session, ctx, key, direction, page),
        Message::LoadClusterAddresses { key, limit } => {
            load_cluster_addresses(session, ctx, key, limit);
            Ok(())
        }
        Message::ResultClusterAddresses { key, addresses } => {
            result_cluster_addresses(session, ctx, key, addresses);
            Ok(())
        }
        Message::SearchNeighbors(search) => {
            search_neighbors(session, ctx, search);
            Ok(())
        }
        Message::ResultSearchNeighbors { search, result } => {
            result_search_neighbors(session, ctx, search, result)
        }
        Message::RedrawGraph => {
            session.view.redraw();
            Ok(())
        }
        Message::RemoveNode(key) => {
            remove_node(session, key);
            Ok(())
        }
        Message::InputNotes { key, note } => {
            input_notes(session, key, note);
            Ok(())
        }
        Message::CancelLoad(key) => {
            debug!(%key, "load cancelled");
            if session.is_loading(&key) {
                session.stop_loading(&key);
            }
            Ok(())
        }
        Message::CreateSnapshot => {
            let state = session.view.create_snapshot();
            session.view.set_undo_redo(state);
            Ok(())
        }
        Message::DisableUndoRedo => {
            session.view.set_undo_redo(UndoState::default());
            Ok(())
        }
        Message::Undo => {
            let state = session.view.undo(&session.store);
            session.view.set_undo_redo(state);
            Ok(())
        }
        Message::Redo => {
            let state = session.view.redo(&session.store);
            session.view.set_undo_redo(state);
            Ok(())
        }
        Message::New => {
            if ctx.is_replaying() {
                return Ok(());
            }
            info!("starting a new graph");
            session.reset();
            ctx.clear_history();
            Ok(())
        }
        Message::FetchError { request, error } => {
            fetch_error(session, request, error);
            Ok(())
        }
    }
}

fn load_stats(session: &mut Session, ctx: &mut Ctx<'_>) {
    let source = session.source.clone();
    fetch(
        ctx,
        async move { source.fetch_stats().await },
        Message::ReceiveStats,
        FailedRequest::Stats,
    );
}

fn receive_stats(session: &mut Session, stats: KeyspaceStats) {
    session.keyspaces = stats.keys().cloned().collect();
    info!(keyspaces = ?session.keyspaces, "keyspaces available");
    session.view.on_stats(&stats);
}

fn search(session: &mut Session, ctx: &mut Ctx<'_>, keyspaces: Vec<String>, term: String) {
    let term = term.trim().to_string();
    if term.chars().count() < session.config.search_min_length {
        debug!(term, "search term too short");
        return;
    }
    let keyspaces = if keyspaces.is_empty() {
        session.keyspaces.clone()
    } else {
        keyspaces
    };
    let limit = session.config.search_limit;
    for keyspace in keyspaces {
        let source = session.source.clone();
        let (query_keyspace, query_term) = (keyspace.clone(), term.clone());
        let (result_keyspace, result_term) = (keyspace.clone(), term.clone());
        fetch(
            ctx,
            async move { source.search(&query_keyspace, &query_term, limit).await },
            move |result| Message::SearchResult {
                keyspace: result_keyspace,
                term: result_term,
                result,
            },
            FailedRequest::Search {
                keyspace,
                term: term.clone(),
            },
        );
    }
}

fn request_node(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    key: EntityKey,
    focus: Option<FocusLink>,
    anchor: Option<Anchor>,
) {
    session.notify(StatusMessage::Loading {
        entity_type: key.entity_type,
        id: key.id.clone(),
    });
    let source = session.source.clone();
    let request = FailedRequest::Node { key: key.clone() };
    fetch(
        ctx,
        async move {
            source
                .fetch_entity(&key.keyspace, key.entity_type, &key.id)
                .await
        },
        move |result| Message::ResultNode {
            focus,
            anchor,
            result,
        },
        request,
    );
}

fn click_search_result(session: &mut Session, ctx: &mut Ctx<'_>, key: EntityKey) {
    session.status.on_loading_state_changed(&key.id, true);
    request_node(session, ctx, key, None, None);
}

fn select_neighbor(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    focus: EntityKey,
    direction: Direction,
    neighbor: Neighbor,
    anchor: Option<Anchor>,
) -> Result<()> {
    let keyspace = neighbor
        .keyspace
        .clone()
        .unwrap_or_else(|| focus.keyspace.clone());
    let key = EntityKey::new(keyspace, neighbor.node_type, neighbor.id.clone());
    let link = FocusLink {
        node: focus,
        direction,
        data: neighbor.edge,
    };

    if let Some(cached) = session.store.get(&key).map(|e| e.to_value()) {
        ctx.publish(Message::ResultNode {
            focus: Some(link),
            anchor,
            result: cached,
        })?;
        return Ok(());
    }
    session.status.on_loading_state_changed(&key.id, true);
    request_node(session, ctx, key, Some(link), anchor);
    Ok(())
}

fn result_node(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    focus: Option<FocusLink>,
    anchor: Option<Anchor>,
    result: Value,
) -> Result<()> {
    let payload = match EntityPayload::from_value(result) {
        Ok(payload) => payload,
        Err(e) => {
            error!("invalid node result: {}", e);
            return Ok(());
        }
    };
    let Some(key) = session.store.add(payload) else {
        return Ok(());
    };

    if let Some(focus) = focus.filter(|f| session.store.contains(&f.node)) {
        match focus.direction {
            Direction::Outgoing => session.store.link_outgoing(
                &focus.node.id,
                &key.id,
                &focus.node.keyspace,
                Some(&focus.data),
            ),
            Direction::Incoming => {
                session
                    .store
                    .link_outgoing(&key.id, &focus.node.id, &key.keyspace, Some(&focus.data))
            }
        };
    }

    session.status.on_loading_state_changed(&key.id, false);
    session.notify(StatusMessage::Loaded {
        entity_type: key.entity_type,
        id: key.id.clone(),
    });
    ctx.publish(Message::AddNode { key, anchor })?;
    Ok(())
}

fn result_tags(session: &mut Session, key: EntityKey, tags: Vec<Tag>) {
    let tags = match serde_json::to_value(&tags) {
        Ok(tags) => tags,
        Err(e) => {
            error!(%key, "cannot store tags: {}", e);
            return;
        }
    };
    if !session.store.set_attribute(&key, "tags", tags) {
        warn!(%key, "tags for an entity not in the store");
        return;
    }
    session.notify(StatusMessage::LoadedTagsFor {
        entity_type: key.entity_type,
        id: key.id.clone(),
    });
    session.view.on_entity_updated(&key);
}

fn select_node(session: &mut Session, key: EntityKey) -> Result<()> {
    if !session.store.contains(&key) {
        return Err(ExplorerError::Structural(format!(
            "selectNode: {} not found in store",
            key
        )));
    }
    session.view.select(&key);
    Ok(())
}

fn egonet_label(key: &EntityKey) -> String {
    format!("neighbors of {} {}", key.entity_type, key.id)
}

fn cluster_addresses_label(key: &EntityKey) -> String {
    format!("addresses of cluster {}", key.id)
}

fn load_egonet(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    key: EntityKey,
    direction: Direction,
    limit: usize,
) {
    session
        .status
        .on_loading_state_changed(&egonet_label(&key), true);
    session.notify(StatusMessage::LoadingNeighbors {
        entity_type: key.entity_type,
        id: key.id.clone(),
        direction,
    });
    let source = session.source.clone();
    let query = key.clone();
    let request = FailedRequest::Egonet {
        key: key.clone(),
        direction,
    };
    fetch(
        ctx,
        async move {
            source
                .fetch_neighbors(
                    &query.keyspace,
                    &query.id,
                    query.entity_type,
                    direction,
                    limit,
                    None,
                )
                .await
        },
        move |page| Message::ResultEgonet {
            key,
            direction,
            page,
        },
        request,
    );
}

fn result_egonet(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    key: EntityKey,
    direction: Direction,
    mut page: NeighborsPage,
) -> Result<()> {
    session.notify(StatusMessage::LoadedNeighbors {
        entity_type: key.entity_type,
        id: key.id.clone(),
        direction,
    });
    session
        .status
        .on_loading_state_changed(&egonet_label(&key), false);

    page.neighbors.retain(|n| n.id != key.id);
    record_neighbors(&mut session.store, &key, &page, direction);

    let anchor = Anchor::new(key.clone(), Some(direction));
    for neighbor in page
        .neighbors
        .into_iter()
        .filter(|n| n.node_type == key.entity_type)
    {
        let keyspace = neighbor.keyspace.unwrap_or_else(|| key.keyspace.clone());
        ctx.publish(Message::AddNode {
            key: EntityKey::new(keyspace, neighbor.node_type, neighbor.id),
            anchor: Some(anchor.clone()),
        })?;
    }
    Ok(())
}

fn load_cluster_addresses(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    key: EntityKey,
    limit: Option<usize>,
) {
    let limit = limit.unwrap_or(session.config.cluster_addresses_limit);
    session.notify(StatusMessage::LoadingClusterAddresses {
        id: key.id.clone(),
        limit,
    });
    session
        .status
        .on_loading_state_changed(&cluster_addresses_label(&key), true);
    let source = session.source.clone();
    let query = key.clone();
    let request = FailedRequest::ClusterAddresses { key: key.clone() };
    fetch(
        ctx,
        async move {
            source
                .fetch_cluster_addresses(&query.keyspace, &query.id, limit)
                .await
        },
        move |addresses| Message::ResultClusterAddresses { key, addresses },
        request,
    );
}

fn result_cluster_addresses(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    key: EntityKey,
    addresses: Vec<Value>,
) {
    session
        .status
        .on_loading_state_changed(&cluster_addresses_label(&key), false);

    let mut members = Vec::with_capacity(addresses.len());
    for raw in addresses {
        let payload = match EntityPayload::from_value(raw) {
            Ok(payload @ EntityPayload::Address(_)) => payload
                .with_default_keyspace(&key.keyspace)
                .with_cluster(key.id.clone()),
            Ok(other) => {
                warn!(cluster = %key, got = %other.entity_type(), "skipping non-address member");
                continue;
            }
            Err(e) => {
                warn!(cluster = %key, "skipping invalid member: {}", e);
                continue;
            }
        };
        if let Some(member) = session.store.add(payload) {
            members.push(member);
        }
    }

    for member in &members {
        let tagged = session.store.get(member).is_some_and(|a| a.has_tags());
        if tagged {
            continue;
        }
        let source = session.source.clone();
        let query = member.clone();
        let result_key = member.clone();
        fetch(
            ctx,
            async move {
                source
                    .fetch_tags(&query.keyspace, &query.id, query.entity_type)
                    .await
            },
            move |tags| Message::ResultTags {
                key: result_key,
                tags,
            },
            FailedRequest::Tags {
                key: member.clone(),
            },
        );
    }

    session.notify(StatusMessage::LoadedClusterAddresses {
        id: key.id.clone(),
        count: members.len(),
    });
    session.view.on_cluster_addresses(&key, &members);
}

fn neighbor_search_label(key: &EntityKey, direction: Direction) -> String {
    format!(
        "searching {} neighbors of {} {}",
        direction, key.entity_type, key.id
    )
}

fn search_neighbors(session: &mut Session, ctx: &mut Ctx<'_>, search: NeighborSearch) {
    debug!(key = %search.key, criterion = %search.criterion, "search neighbors");
    session
        .status
        .on_loading_state_changed(&neighbor_search_label(&search.key, search.direction), true);
    session.notify(StatusMessage::SearchingNeighbors {
        entity_type: search.key.entity_type,
        id: search.key.id.clone(),
        direction: search.direction,
        criterion: search.criterion.clone(),
    });
    let source = session.source.clone();
    let query = search.clone();
    let request = FailedRequest::SearchNeighbors {
        key: search.key.clone(),
        direction: search.direction,
    };
    fetch(
        ctx,
        async move {
            source
                .search_neighbors(
                    &query.key,
                    query.direction,
                    &query.criterion,
                    query.depth,
                    query.breadth,
                )
                .await
        },
        move |result| Message::ResultSearchNeighbors { search, result },
        request,
    );
}

fn result_search_neighbors(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    search: NeighborSearch,
    result: NeighborSearchResult,
) -> Result<()> {
    session
        .status
        .on_loading_state_changed(&neighbor_search_label(&search.key, search.direction), false);
    let mut found = 0;
    add_search_paths(session, ctx, &search, &search.key, result.paths, &mut found)?;
    info!(key = %search.key, found, "neighbor search done");
    session.notify(StatusMessage::FoundNeighbors {
        count: found,
        criterion: search.criterion.clone(),
    });
    Ok(())
}

/// Stores every hop below `parent`, links it along the search direction and
/// prefetches its degrees. `found` counts completed paths.
fn add_search_paths(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    search: &NeighborSearch,
    parent: &EntityKey,
    paths: Option<Vec<SearchPath>>,
    found: &mut usize,
) -> Result<()> {
    let Some(paths) = paths else {
        *found += 1;
        return Ok(());
    };
    let keyspace = &search.key.keyspace;
    for path in paths {
        let payload = match EntityPayload::from_value(path.node) {
            Ok(payload) => payload.with_default_keyspace(keyspace),
            Err(e) => {
                warn!(parent = %parent, "skipping invalid path node: {}", e);
                continue;
            }
        };
        let Some(node) = session.store.add(payload) else {
            continue;
        };
        match search.direction {
            Direction::Outgoing => {
                session
                    .store
                    .link_outgoing(&parent.id, &node.id, keyspace, path.relation.as_ref())
            }
            Direction::Incoming => {
                session
                    .store
                    .link_outgoing(&node.id, &parent.id, keyspace, path.relation.as_ref())
            }
        };
        ctx.publish(Message::LoadDegree {
            context: DegreeContext::new(node.clone(), Message::RedrawGraph),
            result: None,
        })?;
        if let Some(entity) = session.store.get(&node).map(|e| e.to_entity()) {
            let anchor = Anchor::new(parent.clone(), Some(search.direction));
            session.view.on_entity_resolved(&entity, Some(&anchor));
        }

        for raw in path.matching_addresses {
            let payload = match EntityPayload::from_value(raw) {
                Ok(payload @ EntityPayload::Address(_)) => {
                    let payload = payload.with_default_keyspace(keyspace);
                    if node.entity_type == EntityType::Cluster {
                        payload.with_cluster(node.id.clone())
                    } else {
                        payload
                    }
                }
                Ok(other) => {
                    warn!(node = %node, got = %other.entity_type(), "skipping non-address match");
                    continue;
                }
                Err(e) => {
                    warn!(node = %node, "skipping invalid matching address: {}", e);
                    continue;
                }
            };
            let Some(address) = session.store.add(payload) else {
                continue;
            };
            if let Some(entity) = session.store.get(&address).map(|e| e.to_entity()) {
                session
                    .view
                    .on_entity_resolved(&entity, Some(&Anchor::new(node.clone(), None)));
            }
        }

        add_search_paths(session, ctx, search, &node, path.paths, found)?;
    }
    Ok(())
}

fn remove_node(session: &mut Session, key: EntityKey) {
    session.notify(StatusMessage::RemovedNode {
        entity_type: key.entity_type,
        id: key.id.clone(),
    });
    if session.is_loading(&key) {
        session.stop_loading(&key);
    }
    session.view.on_entity_removed(&key);
}

fn input_notes(session: &mut Session, key: EntityKey, note: String) {
    if session.store.set_attribute(&key, "notes", Value::String(note)) {
        session.view.on_entity_updated(&key);
    } else {
        warn!(%key, "notes for an entity not in the store");
    }
}

fn fetch_error(session: &mut Session, request: FailedRequest, error: FetchError) {
    error!(?request, "{}", error);
    let message = error.to_string();
    match request {
        FailedRequest::Search { keyspace, .. } => {
            session.notify(StatusMessage::SearchFailed {
                keyspace: error.keyspace.or(Some(keyspace)),
                message: error.message,
            });
        }
        FailedRequest::Node { key } => {
            session.stop_loading(&key);
            session.notify(StatusMessage::Error { message });
        }
        FailedRequest::Egonet { key, .. } => {
            session
                .status
                .on_loading_state_changed(&egonet_label(&key), false);
            session.notify(StatusMessage::Error { message });
        }
        FailedRequest::SearchNeighbors { key, direction } => {
            session
                .status
                .on_loading_state_changed(&neighbor_search_label(&key, direction), false);
            session.notify(StatusMessage::Error { message });
        }
        FailedRequest::ClusterAddresses { key } => {
            session
                .status
                .on_loading_state_changed(&cluster_addresses_label(&key), false);
            session.notify(StatusMessage::Error { message });
        }
        FailedRequest::ClusterFor { .. }
        | FailedRequest::Neighbors { .. }
        | FailedRequest::Tags { .. }
        | FailedRequest::Stats => session.notify(StatusMessage::Error { message }),
    }
}
