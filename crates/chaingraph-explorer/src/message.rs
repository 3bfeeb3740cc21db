use chaingraph_bus::{BusMessage, Vocabulary};
use chaingraph_core::{
    Anchor, Direction, EdgeData, EntityKey, FetchError, KeyspaceStats, Neighbor,
    NeighborSearchResult, NeighborsPage, SearchCriterion, Tag,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stages of the node-loading chain, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadStage {
    /// Look the entity up in the store, fetch it when absent.
    Lookup,
    /// Merge the entity, fetch the owning cluster of a cluster-less address.
    Merge,
    /// Attach the fetched (or a mockup) cluster to the address.
    ClusterFor,
    /// Hand over to the degree prefetch.
    Degree,
    /// Fetch missing tags and report the entity as resolved.
    Resolve,
}

/// Orchestration context threaded through the node-loading chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadContext {
    pub stage: LoadStage,
    pub key: EntityKey,
    #[serde(default)]
    pub anchor: Option<Anchor>,
}

impl LoadContext {
    pub fn new(key: EntityKey, anchor: Option<Anchor>) -> Self {
        Self {
            stage: LoadStage::Lookup,
            key,
            anchor,
        }
    }

    pub fn at(&self, stage: LoadStage) -> Self {
        Self {
            stage,
            ..self.clone()
        }
    }

    /// Same stage and anchor for another entity.
    pub fn with_key(&self, key: EntityKey) -> Self {
        Self {
            key,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DegreeStage {
    Incoming,
    Outgoing,
    Apply,
}

/// Context of the degree prefetch. `back_call` is published once it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DegreeContext {
    pub stage: DegreeStage,
    /// The entity whose degrees are prefetched.
    pub key: EntityKey,
    /// The load this prefetch runs for, if any. Once it leaves the loading set
    /// every remaining stage is dropped.
    #[serde(default)]
    pub origin: Option<EntityKey>,
    pub back_call: Box<Message>,
}

impl DegreeContext {
    pub fn new(key: EntityKey, back_call: Message) -> Self {
        Self {
            stage: DegreeStage::Incoming,
            key,
            origin: None,
            back_call: Box::new(back_call),
        }
    }

    pub fn on_behalf_of(self, origin: EntityKey) -> Self {
        Self {
            origin: Some(origin),
            ..self
        }
    }

    pub fn at(&self, stage: DegreeStage) -> Self {
        Self {
            stage,
            ..self.clone()
        }
    }
}

/// Edge to record between a focused node and a neighbor picked from its table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusLink {
    pub node: EntityKey,
    pub direction: Direction,
    #[serde(default)]
    pub data: EdgeData,
}

/// Neighbor path search parameters, echoed back with the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborSearch {
    pub key: EntityKey,
    pub direction: Direction,
    pub criterion: SearchCriterion,
    pub depth: usize,
    pub breadth: usize,
}

/// What was being attempted when a fetch failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FailedRequest {
    Search { keyspace: String, term: String },
    Node { key: EntityKey },
    ClusterFor { key: EntityKey },
    Neighbors { key: EntityKey, direction: Direction },
    Egonet { key: EntityKey, direction: Direction },
    SearchNeighbors { key: EntityKey, direction: Direction },
    ClusterAddresses { key: EntityKey },
    Tags { key: EntityKey },
    Stats,
}

/// Every message the explorer bus accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "name",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Message {
    Stats,
    ReceiveStats(KeyspaceStats),
    Search {
        #[serde(default)]
        keyspaces: Vec<String>,
        term: String,
    },
    SearchResult {
        keyspace: String,
        term: String,
        result: Value,
    },
    ClickSearchResult {
        key: EntityKey,
    },
    SelectNeighbor {
        focus: EntityKey,
        direction: Direction,
        neighbor: Neighbor,
        #[serde(default)]
        anchor: Option<Anchor>,
    },
    ResultNode {
        #[serde(default)]
        focus: Option<FocusLink>,
        #[serde(default)]
        anchor: Option<Anchor>,
        result: Value,
    },
    AddNode {
        key: EntityKey,
        #[serde(default)]
        anchor: Option<Anchor>,
    },
    AddNodeCont {
        context: LoadContext,
        #[serde(default)]
        result: Option<Value>,
    },
    LoadDegree {
        context: DegreeContext,
        #[serde(default)]
        result: Option<NeighborsPage>,
    },
    ResultTags {
        key: EntityKey,
        tags: Vec<Tag>,
    },
    SelectNode(EntityKey),
    LoadEgonet {
        key: EntityKey,
        direction: Direction,
        limit: usize,
    },
    ResultEgonet {
        key: EntityKey,
        direction: Direction,
        page: NeighborsPage,
    },
    LoadClusterAddresses {
        key: EntityKey,
        #[serde(default)]
        limit: Option<usize>,
    },
    ResultClusterAddresses {
        key: EntityKey,
        addresses: Vec<Value>,
    },
    SearchNeighbors(NeighborSearch),
    ResultSearchNeighbors {
        search: NeighborSearch,
        result: NeighborSearchResult,
    },
    RedrawGraph,
    RemoveNode(EntityKey),
    InputNotes {
        key: EntityKey,
        note: String,
    },
    CancelLoad(EntityKey),
    CreateSnapshot,
    DisableUndoRedo,
    Undo,
    Redo,
    New,
    FetchError {
        request: FailedRequest,
        error: FetchError,
    },
}

impl BusMessage for Message {
    fn name(&self) -> &'static str {
        match self {
            Message::Stats => "stats",
            Message::ReceiveStats(_) => "receiveStats",
            Message::Search { .. } => "search",
            Message::SearchResult { .. } => "searchResult",
            Message::ClickSearchResult { .. } => "clickSearchResult",
            Message::SelectNeighbor { .. } => "selectNeighbor",
            Message::ResultNode { .. } => "resultNode",
            Message::AddNode { .. } => "addNode",
            Message::AddNodeCont { .. } => "addNodeCont",
            Message::LoadDegree { .. } => "loadDegree",
            Message::ResultTags { .. } => "resultTags",
            Message::SelectNode(_) => "selectNode",
            Message::LoadEgonet { .. } => "loadEgonet",
            Message::ResultEgonet { .. } => "resultEgonet",
            Message::LoadClusterAddresses { .. } => "loadClusterAddresses",
            Message::ResultClusterAddresses { .. } => "resultClusterAddresses",
            Message::SearchNeighbors(_) => "searchNeighbors",
            Message::ResultSearchNeighbors { .. } => "resultSearchNeighbors",
            Message::RedrawGraph => "redrawGraph",
            Message::RemoveNode(_) => "removeNode",
            Message::InputNotes { .. } => "inputNotes",
            Message::CancelLoad(_) => "cancelLoad",
            Message::CreateSnapshot => "createSnapshot",
            Message::DisableUndoRedo => "disableUndoRedo",
            Message::Undo => "undo",
            Message::Redo => "redo",
            Message::New => "new",
            Message::FetchError { .. } => "fetchError",
        }
    }
}

pub const SYNC_MESSAGES: &[&str] = &["search"];

/// Messages that change the graph.
pub const DIRTY_MESSAGES: &[&str] = &[
    "addNode",
    "addNodeCont",
    "resultNode",
    "resultClusterAddresses",
    "resultEgonet",
    "resultSearchNeighbors",
    "removeNode",
];

pub const DEFERRED_MESSAGES: &[&str] = &[
    "stats",
    "receiveStats",
    "searchResult",
    "clickSearchResult",
    "selectNeighbor",
    "loadDegree",
    "resultTags",
    "selectNode",
    "loadEgonet",
    "loadClusterAddresses",
    "searchNeighbors",
    "redrawGraph",
    "inputNotes",
    "cancelLoad",
    "createSnapshot",
    "disableUndoRedo",
    "undo",
    "redo",
    "new",
    "fetchError",
];

pub fn vocabulary() -> Vocabulary {
    let vocabulary = SYNC_MESSAGES
        .iter()
        .fold(Vocabulary::new(), |v, &name| v.synchronous(name));
    let vocabulary = DIRTY_MESSAGES.iter().fold(vocabulary, |v, &name| v.dirty(name));
    DEFERRED_MESSAGES
        .iter()
        .fold(vocabulary, |v, &name| v.deferred(name))
}

pub fn message_names() -> impl Iterator<Item = &'static str> {
    SYNC_MESSAGES
        .iter()
        .chain(DIRTY_MESSAGES)
        .chain(DEFERRED_MESSAGES)
        .copied()
}
