use indexmap::IndexMap;
use serde::{Serialize, Deserialize};

use crate::errors::Error;

/// Node identity in the contact log. Nothing beyond identity is attached
/// to a node.
pub type NodeId = i64;

/// A continuous period during which the owning node is in contact with
/// `partner`. Exposure semantics are half-open: `start <= t < end`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactInterval {
    pub partner: NodeId,
    pub start: i64,
    pub end: i64,
}

impl ContactInterval {
    pub fn new(partner: NodeId, start: i64, end: i64) -> Self {
        Self { partner, start, end }
    }

    /// True if any part of the interval falls inside `[window_start, window_end)`.
    pub fn overlaps(&self, window_start: i64, window_end: i64) -> bool {
        self.start < window_end && self.end > window_start
    }
}

/// Per-node adjacency over a temporal contact log: each node maps to the
/// ordered list of intervals during which it was in contact with a partner.
/// Both directions of every contact are stored as separate entries.
///
/// Node iteration follows insertion order, so a run over the same log with
/// the same random stream is reproducible.
#[derive(Debug, Clone, Default)]
pub struct ContactIndex {
    contacts: IndexMap<NodeId, Vec<ContactInterval>>,
}

impl ContactIndex {
    pub fn new() -> Self {
        Self {
            contacts: IndexMap::new(),
        }
    }

    /// Parse a tab-separated edge list, one contact per line:
    /// `id1 <TAB> id2 <TAB> start <TAB> end`. Both directions of every
    /// contact are materialized. Blank lines are skipped; trailing fields
    /// beyond the fourth are ignored.
    pub fn from_tsv(data: &str) -> Result<Self, Error> {
        let mut index = Self::new();
        for (i, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 4 {
                return Err(Error::InvalidContactRecord {
                    line: i + 1,
                    reason: format!("expected 4 fields, found {}", fields.len()),
                });
            }

            let id1 = parse_field(fields[0], i)?;
            let id2 = parse_field(fields[1], i)?;
            let start = parse_field(fields[2], i)?;
            let end = parse_field(fields[3], i)?;

            if end <= start {
                return Err(Error::InvalidContactRecord {
                    line: i + 1,
                    reason: format!("interval end {} not after start {}", end, start),
                });
            }

            index.add_contact(id1, id2, start, end);
        }
        Ok(index)
    }

    /// Record a contact between `a` and `b`. The contact relation is
    /// symmetric, so an entry is added under both nodes.
    pub fn add_contact(&mut self, a: NodeId, b: NodeId, start: i64, end: i64) {
        self.insert_interval(a, ContactInterval::new(b, start, end));
        self.insert_interval(b, ContactInterval::new(a, start, end));
    }

    /// Record a single direction of a contact.
    pub fn insert_interval(&mut self, owner: NodeId, interval: ContactInterval) {
        self.contacts.entry(owner).or_insert_with(Vec::new).push(interval);
    }

    /// Register a node with no contacts of its own.
    pub fn insert_node(&mut self, node: NodeId) {
        self.contacts.entry(node).or_insert_with(Vec::new);
    }

    pub fn get(&self, node: NodeId) -> Option<&[ContactInterval]> {
        self.contacts.get(&node).map(|intervals| intervals.as_slice())
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.contacts.contains_key(&node)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.contacts.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Earliest time at which `node` appears in any of its contacts; the
    /// usual start time for a run seeded at `node`.
    pub fn earliest_contact_start(&self, node: NodeId) -> Option<i64> {
        self.get(node).and_then(|intervals| intervals.iter().map(|c| c.start).min())
    }
}

fn parse_field(field: &str, line_index: usize) -> Result<i64, Error> {
    field.trim().parse().map_err(|_| Error::InvalidContactRecord {
        line: line_index + 1,
        reason: format!("not an integer: {:?}", field),
    })
}
