use chaingraph_core::{Direction, EntityAttributes, EntityKey, NeighborsPage, StatusMessage};
use chaingraph_graph::GraphStore;
use tracing::{debug, warn};

use crate::error::Result;
use crate::handlers::{fetch, Ctx};
use crate::message::{DegreeContext, DegreeStage, FailedRequest, Message};
use crate::session::Session;

/// Bounded neighbor prefetch. Loads at most `degree_threshold` incoming and outgoing
/// neighbors of an entity, then publishes the context's back call.
pub(crate) fn load_degree(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    context: DegreeContext,
    result: Option<NeighborsPage>,
) -> Result<()> {
    debug!(key = %context.key, stage = ?context.stage, "loadDegree");
    if let Some(origin) = context.origin.as_ref() {
        if !session.is_loading(origin) {
            debug!(%origin, stage = ?context.stage, "load cancelled, dropping degree stage");
            return Ok(());
        }
    }
    match context.stage {
        DegreeStage::Incoming => fetch_incoming(session, ctx, context),
        DegreeStage::Outgoing => fetch_outgoing(session, ctx, context, result),
        DegreeStage::Apply => apply_outgoing(session, ctx, context, result),
    }
}

fn fetch_incoming(session: &mut Session, ctx: &mut Ctx<'_>, context: DegreeContext) -> Result<()> {
    let threshold = session.config.degree_threshold;
    let Some(in_degree) = session.store.get(&context.key).map(|e| e.in_degree()) else {
        warn!(key = %context.key, "degree prefetch for an entity not in the store");
        return Ok(());
    };
    if in_degree >= threshold || in_degree == 0 {
        debug!(key = %context.key, in_degree, threshold, "skipping incoming neighbors");
        ctx.publish(Message::LoadDegree {
            context: context.at(DegreeStage::Outgoing),
            result: None,
        })?;
        return Ok(());
    }
    request_neighbors(
        session,
        ctx,
        context.at(DegreeStage::Outgoing),
        Direction::Incoming,
    );
    Ok(())
}

fn fetch_outgoing(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    context: DegreeContext,
    result: Option<NeighborsPage>,
) -> Result<()> {
    let key = &context.key;
    if let Some(page) = result {
        session.notify(StatusMessage::LoadedNeighbors {
            entity_type: key.entity_type,
            id: key.id.clone(),
            direction: Direction::Incoming,
        });
        record_neighbors(&mut session.store, key, &page, Direction::Incoming);
    }

    let threshold = session.config.degree_threshold;
    let Some(out_degree) = session.store.get(key).map(|e| e.out_degree()) else {
        warn!(key = %key, "degree prefetch for an entity not in the store");
        return Ok(());
    };
    let known = session.store.outgoing_count(&key.keyspace, &key.id) as u64;
    if out_degree >= threshold || known >= out_degree {
        debug!(key = %key, out_degree, known, threshold, "skipping outgoing neighbors");
        ctx.publish(*context.back_call)?;
        return Ok(());
    }
    request_neighbors(
        session,
        ctx,
        context.at(DegreeStage::Apply),
        Direction::Outgoing,
    );
    Ok(())
}

fn apply_outgoing(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    context: DegreeContext,
    result: Option<NeighborsPage>,
) -> Result<()> {
    let key = &context.key;
    session.notify(StatusMessage::LoadedNeighbors {
        entity_type: key.entity_type,
        id: key.id.clone(),
        direction: Direction::Outgoing,
    });
    if let Some(page) = result {
        record_neighbors(&mut session.store, key, &page, Direction::Outgoing);
    }
    ctx.publish(*context.back_call)?;
    Ok(())
}

/// `next` is the context the page is delivered with.
fn request_neighbors(
    session: &mut Session,
    ctx: &mut Ctx<'_>,
    next: DegreeContext,
    direction: Direction,
) {
    let key = next.key.clone();
    session.notify(StatusMessage::LoadingNeighbors {
        entity_type: key.entity_type,
        id: key.id.clone(),
        direction,
    });
    let source = session.source.clone();
    let page_size = session.config.degree_threshold as usize;
    let request = FailedRequest::Neighbors {
        key: key.clone(),
        direction,
    };
    fetch(
        ctx,
        async move {
            source
                .fetch_neighbors(
                    &key.keyspace,
                    &key.id,
                    key.entity_type,
                    direction,
                    page_size,
                    None,
                )
                .await
        },
        move |page| Message::LoadDegree {
            context: next,
            result: Some(page),
        },
        request,
    );
}

/// Records an edge per same-type neighbor: `neighbor -> key` for incoming pages,
/// `key -> neighbor` for outgoing ones. Returns the number of edges touched.
pub(crate) fn record_neighbors(
    store: &mut GraphStore,
    key: &EntityKey,
    page: &NeighborsPage,
    direction: Direction,
) -> usize {
    let mut recorded = 0;
    for neighbor in page
        .neighbors
        .iter()
        .filter(|n| n.node_type == key.entity_type)
    {
        match direction {
            Direction::Incoming => {
                let keyspace = neighbor.keyspace.as_deref().unwrap_or(&key.keyspace);
                store.link_outgoing(&neighbor.id, &key.id, keyspace, Some(&neighbor.edge));
            }
            Direction::Outgoing => {
                store.link_outgoing(&key.id, &neighbor.id, &key.keyspace, Some(&neighbor.edge));
            }
        }
        recorded += 1;
    }
    recorded
}
