use chaingraph_core::{EdgeData, EdgeStats};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outgoing edges of one source: target id to stats, `None` when the edge is known
/// but its aggregates are not.
pub type EdgeTable = BTreeMap<String, Option<EdgeStats>>;

/// What a `link_outgoing` call did to the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeUpsert {
    Created,
    Upgraded,
    Refreshed,
    Unchanged,
}

impl EdgeUpsert {
    pub fn changed(&self) -> bool {
        !matches!(self, EdgeUpsert::Unchanged)
    }
}

/// Upgrade-only merge of `data` into the slot for one target.
pub(crate) fn upsert(table: &mut EdgeTable, target: &str, data: Option<&EdgeData>) -> EdgeUpsert {
    let complete = data.and_then(EdgeData::complete);
    if !table.contains_key(target) {
        table.insert(target.to_string(), complete);
        return EdgeUpsert::Created;
    }
    let (Some(slot), Some(stats)) = (table.get_mut(target), complete) else {
        return EdgeUpsert::Unchanged;
    };
    match slot {
        None => {
            *slot = Some(stats);
            EdgeUpsert::Upgraded
        }
        Some(current) if *current == stats => EdgeUpsert::Unchanged,
        Some(current) => {
            *current = stats;
            EdgeUpsert::Refreshed
        }
    }
}

/// One serialized edge: `{key: target, value: stats | null}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeEntry {
    pub key: String,
    #[serde(default)]
    pub value: Option<EdgeData>,
}

impl EdgeEntry {
    pub fn from_table(table: &EdgeTable) -> Vec<EdgeEntry> {
        table
            .iter()
            .map(|(key, stats)| EdgeEntry {
                key: key.clone(),
                value: stats.clone().map(EdgeData::from),
            })
            .collect()
    }
}
