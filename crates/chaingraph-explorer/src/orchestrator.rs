//! The node-loading chain.
//!
//! `addNode` starts a chain for one `(keyspace, type, id)`; every later step is an
//! `addNodeCont` message carrying a [`LoadContext`]. A stage either publishes the
//! next one directly or spawns a fetch whose result arrives as the next one, so a
//! replay of the recorded messages walks the same path without touching the
//! network. A stage whose id has left the loading set does nothing.

use chaingraph_core::{
    Anchor, Direction, EntityAttributes, EntityKey, EntityPayload, EntityRef, StatusMessage,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::handlers::{fetch, Ctx};
use crate::message::{DegreeContext, FailedRequest, LoadContext, LoadStage, Message};
use crate::session::Session;

pub const MOCKUP_PREFIX: &str = "mockup";

/// Synthetic single-address cluster for an address the backend reports no cluster for.
pub fn mockup_cluster(address: &EntityKey) -> EntityPayload {
    EntityPayload::cluster(&address.keyspace, format!("{}{}", MOCKUP_PREFIX, address.id))
        .with_attribute("mockup", Value::Bool(true))
}

pub(crate) fn add_node(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    key: EntityKey,
    anchor: Option<Anchor>,
) -> Result<()> {
    debug!(%key, ?anchor, "add node");
    session.start_loading(&key);
    ctx.publish(Message::AddNodeCont {
        context: LoadContext::new(key, anchor),
        result: None,
    })?;
    Ok(())
}

pub(crate) fn advance(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    context: LoadContext,
    result: Option<Value>,
) -> Result<()> {
    debug!(key = %context.key, stage = ?context.stage, "addNodeCont");
    match context.stage {
        LoadStage::Lookup => lookup(session, ctx, context),
        LoadStage::Merge => merge(session, ctx, context, result),
        LoadStage::ClusterFor => attach_cluster(session, ctx, context, result),
        LoadStage::Degree => prefetch_degree(session, ctx, context),
        LoadStage::Resolve => resolve(session, ctx, context),
    }
}

fn cancelled(session: &Session, context: &LoadContext) -> bool {
    if session.is_loading(&context.key) {
        return false;
    }
    debug!(key = %context.key, stage = ?context.stage, "not loading anymore, dropping stage");
    true
}

fn lookup(session: &mut Session, ctx: &mut Ctx<'_>, context: LoadContext) -> Result<()> {
    if cancelled(session, &context) {
        return Ok(());
    }
    if let Some(cached) = session.store.get(&context.key).map(|e| e.to_value()) {
        ctx.publish(Message::AddNodeCont {
            context: context.at(LoadStage::Merge),
            result: Some(cached),
        })?;
        return Ok(());
    }

    let key = context.key.clone();
    session.notify(StatusMessage::Loading {
        entity_type: key.entity_type,
        id: key.id.clone(),
    });
    let source = session.source.clone();
    let next = context.at(LoadStage::Merge);
    let request = FailedRequest::Node { key: key.clone() };
    fetch(
        ctx,
        async move {
            source
                .fetch_entity(&key.keyspace, key.entity_type, &key.id)
                .await
        },
        move |value| Message::AddNodeCont {
            context: next,
            result: Some(value),
        },
        request,
    );
    Ok(())
}

fn merge(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    context: LoadContext,
    result: Option<Value>,
) -> Result<()> {
    let Some(raw) = result else {
        warn!(key = %context.key, "merge stage without a result");
        return Ok(());
    };
    let payload = match EntityPayload::from_value(raw) {
        Ok(payload) => payload.with_default_keyspace(&context.key.keyspace),
        Err(e) => {
            error!(key = %context.key, "invalid entity: {}", e);
            session.notify(StatusMessage::Error {
                message: format!("invalid {} {}: {}", context.key.entity_type, context.key.id, e),
            });
            session.stop_loading(&context.key);
            return Ok(());
        }
    };
    let Some(key) = session.store.add(payload) else {
        session.stop_loading(&context.key);
        return Ok(());
    };
    session.notify(StatusMessage::Loaded {
        entity_type: key.entity_type,
        id: key.id.clone(),
    });

    // Incoming neighbor of the anchor: new entity -> anchor.
    if let Some(anchor) = &context.anchor {
        if anchor.direction == Some(Direction::Incoming) {
            session
                .store
                .link_outgoing(&key.id, &anchor.node.id, &key.keyspace, None);
        }
    }

    if cancelled(session, &context) {
        return Ok(());
    }
    if key != context.key {
        debug!(requested = %context.key, merged = %key, "continuing with merged key");
        session.stop_loading(&context.key);
        session.start_loading(&key);
    }
    let context = context.with_key(key);

    let needs_cluster = session
        .store
        .get(&context.key)
        .and_then(|entity| entity.as_address())
        .is_some_and(|address| address.cluster.is_none());
    if !needs_cluster {
        ctx.publish(Message::AddNodeCont {
            context: context.at(LoadStage::Degree),
            result: None,
        })?;
        return Ok(());
    }

    session.notify(StatusMessage::LoadingClusterFor {
        id: context.key.id.clone(),
    });
    let source = session.source.clone();
    let key = context.key.clone();
    let next = context.at(LoadStage::ClusterFor);
    fetch(
        ctx,
        async move { source.fetch_cluster_for_address(&key.keyspace, &key.id).await },
        move |cluster| Message::AddNodeCont {
            context: next,
            result: cluster,
        },
        FailedRequest::ClusterFor {
            key: context.key.clone(),
        },
    );
    Ok(())
}

fn attach_cluster(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    context: LoadContext,
    result: Option<Value>,
) -> Result<()> {
    if cancelled(session, &context) {
        return Ok(());
    }
    let address = &context.key;
    let fetched = result.and_then(|raw| match EntityPayload::from_value(raw) {
        Ok(cluster @ EntityPayload::Cluster(_)) => Some(cluster),
        Ok(other) => {
            warn!(address = %address, got = %other.entity_type(), "cluster lookup returned no cluster");
            None
        }
        Err(e) => {
            debug!(address = %address, "no cluster in response: {}", e);
            None
        }
    });

    let cluster = match fetched {
        Some(cluster) => {
            session.notify(StatusMessage::LoadedClusterFor {
                id: address.id.clone(),
            });
            cluster.with_default_keyspace(&address.keyspace)
        }
        None => {
            session.notify(StatusMessage::NoClusterFor {
                id: address.id.clone(),
            });
            mockup_cluster(address)
        }
    };
    session.store.add(cluster.with_members([address.id.clone()]));

    ctx.publish(Message::AddNodeCont {
        context: context.at(LoadStage::Degree),
        result: None,
    })?;
    Ok(())
}

/// The entity whose degrees get prefetched: a cluster itself, an address's real
/// cluster, or the address when its cluster is a mockup or missing.
fn degree_bearing(session: &Session, entity: EntityRef<'_>) -> EntityKey {
    match entity {
        EntityRef::Cluster(cluster) => cluster.key(),
        EntityRef::Address(address) => address
            .cluster_key()
            .filter(|key| {
                session
                    .store
                    .get(key)
                    .is_some_and(|cluster| !cluster.is_mockup())
            })
            .unwrap_or_else(|| address.key()),
    }
}

fn prefetch_degree(session: &mut Session, ctx: &mut Ctx<'_>, context: LoadContext) -> Result<()> {
    if cancelled(session, &context) {
        return Ok(());
    }
    let Some(entity) = session.store.get(&context.key) else {
        warn!(key = %context.key, "degree stage for an entity not in the store");
        return Ok(());
    };
    let bearing = degree_bearing(session, entity);
    debug!(key = %context.key, %bearing, "prefetching degree");

    let back_call = Message::AddNodeCont {
        context: context.at(LoadStage::Resolve),
        result: None,
    };
    ctx.publish(Message::LoadDegree {
        context: DegreeContext::new(bearing, back_call).on_behalf_of(context.key.clone()),
        result: None,
    })?;
    Ok(())
}

fn resolve(session: &mut Session, ctx: &mut Ctx<'_>, context: LoadContext) -> Result<()> {
    if cancelled(session, &context) {
        return Ok(());
    }
    let Some(resolved) = session.store.get(&context.key).map(|e| e.to_entity()) else {
        warn!(key = %context.key, "resolved entity missing from the store");
        session.stop_loading(&context.key);
        return Ok(());
    };

    if !resolved.has_tags() {
        let key = context.key.clone();
        session.notify(StatusMessage::LoadingTagsFor {
            entity_type: key.entity_type,
            id: key.id.clone(),
        });
        let source = session.source.clone();
        let tagged = key.clone();
        fetch(
            ctx,
            async move {
                source
                    .fetch_tags(&key.keyspace, &key.id, key.entity_type)
                    .await
            },
            move |tags| Message::ResultTags { key: tagged, tags },
            FailedRequest::Tags {
                key: context.key.clone(),
            },
        );
    }

    session
        .view
        .on_entity_resolved(&resolved, context.anchor.as_ref());
    info!(key = %context.key, "entity resolved");
    session.stop_loading(&context.key);
    Ok(())
}
