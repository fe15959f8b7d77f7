//! RGA Text - replicated attributed text based on the Replicated Growable Array.
//!
//! Provides character-level collaborative text editing with:
//! - Insert at any position, with explicit or inherited attributes
//! - Delete ranges
//! - Format ranges (per-character last-writer-wins attribute registers)
//! - A run enumeration of the visible text as a rich-text delta
//! - A change feed of origin-tagged [`TextEvent`]s
//!
//! Identifiers carry Lamport sequence numbers, so a character inserted after
//! observing another always sorts before that character's older siblings.
//! Updates whose dependencies have not arrived yet are parked until they can
//! be integrated.

use crate::attrs::{normalize_patch, AttrKey, AttrPatch, AttrValue, Attributes};
use crate::delta::{push_char, DeltaOp, Origin, Run, TextChange, TextEvent};
use crate::error::{Result, TextError};
use redline_core::{Lattice, LwwRegister, Stamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Unique identifier for a character in the text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextId {
    /// The replica that created this character.
    pub replica: String,
    /// Lamport sequence number at creation.
    pub seq: u64,
}

impl TextId {
    pub fn new(replica: impl Into<String>, seq: u64) -> Self {
        Self {
            replica: replica.into(),
            seq,
        }
    }

    /// The virtual start of text.
    pub fn genesis() -> Self {
        Self {
            replica: "".to_string(),
            seq: 0,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.seq == 0 && self.replica.is_empty()
    }
}

impl PartialOrd for TextId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TextId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher sequence = later in causal order
        // Tie-break on replica ID for determinism
        self.seq
            .cmp(&other.seq)
            .then_with(|| self.replica.cmp(&other.replica))
    }
}

type AttrRegister = LwwRegister<Option<AttrValue>>;

/// A character node in the RGA text.
#[derive(Clone, Debug, PartialEq, Eq)]
struct TextNode {
    id: TextId,
    ch: char,
    /// The ID of the character this was inserted after.
    origin: TextId,
    /// Tombstone flag; deleted nodes stay in the tree to anchor their children.
    deleted: bool,
    attrs: BTreeMap<AttrKey, AttrRegister>,
}

impl TextNode {
    fn attributes(&self) -> Attributes {
        self.attrs
            .iter()
            .filter_map(|(k, reg)| reg.get().clone().map(|v| (k.clone(), v)))
            .collect()
    }
}

/// Registers for a freshly inserted character. A tracking key is always
/// written together with a cleared partner.
fn registers_for(attrs: &Attributes, stamp: &Stamp) -> BTreeMap<AttrKey, AttrRegister> {
    let patch: AttrPatch = attrs
        .iter()
        .map(|(k, v)| (k.clone(), Some(v.clone())))
        .collect();
    normalize_patch(&patch)
        .into_iter()
        .map(|(k, v)| (k, LwwRegister::new(v, stamp.clone())))
        .collect()
}

/// A character as shipped between replicas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertRecord {
    pub id: TextId,
    pub ch: char,
    pub origin: TextId,
    pub attrs: Vec<(AttrKey, AttrRegister)>,
}

/// An attribute write on one character.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRecord {
    pub id: TextId,
    pub key: AttrKey,
    pub register: AttrRegister,
}

/// Replication payload: either the ops of one or more local transactions, or
/// the full state of a replica (see [`RGAText::state_update`]).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUpdate {
    pub inserts: Vec<InsertRecord>,
    pub deletes: Vec<TextId>,
    pub formats: Vec<FormatRecord>,
}

impl TextUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty() && self.formats.is_empty()
    }

    pub fn extend(&mut self, other: TextUpdate) {
        self.inserts.extend(other.inserts);
        self.deletes.extend(other.deletes);
        self.formats.extend(other.formats);
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Collaborative attributed text using the RGA algorithm.
#[derive(Clone, Debug)]
pub struct RGAText {
    /// All nodes indexed by their ID.
    nodes: HashMap<TextId, TextNode>,
    /// Children of each node, sorted by ID descending.
    children: HashMap<TextId, Vec<TextId>>,
    replica_id: String,
    /// Lamport clock shared by character ids and attribute stamps.
    clock: u64,
    /// Origin stamped on events produced by local calls.
    origin: Origin,
    /// Ops produced locally and not yet taken for replication.
    pending_update: Option<TextUpdate>,
    /// Remote ops waiting for a character they reference.
    stalled: TextUpdate,
    /// Change feed, drained by the owner after every transaction.
    events: Vec<TextEvent>,
}

impl RGAText {
    /// Create a new empty text.
    pub fn new(replica_id: impl Into<String>) -> Self {
        let mut text = Self {
            nodes: HashMap::new(),
            children: HashMap::new(),
            replica_id: replica_id.into(),
            clock: 0,
            origin: Origin::Local,
            pending_update: None,
            stalled: TextUpdate::new(),
            events: Vec::new(),
        };
        text.children.insert(TextId::genesis(), Vec::new());
        text
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// Run `f` with events tagged `origin`, restoring the previous origin after.
    pub fn with_origin<R>(&mut self, origin: Origin, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.origin, origin);
        let result = f(self);
        self.origin = previous;
        result
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn observe_clock(&mut self, lamport: u64) {
        self.clock = self.clock.max(lamport);
    }

    fn next_id(&mut self) -> TextId {
        let seq = self.tick();
        TextId::new(&self.replica_id, seq)
    }

    fn emit(&mut self, change: TextChange) {
        if change.is_empty() {
            return;
        }
        let event = TextEvent::new(self.origin, change);
        if let Some(last) = self.events.last_mut() {
            if last.try_extend(&event) {
                return;
            }
        }
        self.events.push(event);
    }

    fn record(&mut self) -> &mut TextUpdate {
        self.pending_update.get_or_insert_with(TextUpdate::new)
    }

    fn check_range(&self, start: usize, length: usize) -> Result<()> {
        let len = self.len();
        if start + length > len {
            return Err(TextError::RangeOutOfBounds {
                start,
                end: start + length,
                length: len,
            });
        }
        Ok(())
    }

    // === Local operations ===

    /// Insert text at `position`, inheriting the attributes of the character
    /// to its left the way rich-text editors do.
    pub fn insert(&mut self, position: usize, text: &str) -> Result<()> {
        let attrs = self.inherited_attributes(position);
        self.insert_with(position, text, &attrs)
    }

    /// Insert text at `position` carrying exactly `attrs`.
    pub fn insert_with(&mut self, position: usize, text: &str, attrs: &Attributes) -> Result<()> {
        let len = self.len();
        if position > len {
            return Err(TextError::PositionOutOfBounds {
                position,
                length: len,
            });
        }
        if text.is_empty() {
            return Ok(());
        }

        let mut origin = if position == 0 {
            TextId::genesis()
        } else {
            self.id_at_index(position - 1)
                .ok_or(TextError::PositionOutOfBounds {
                    position,
                    length: len,
                })?
        };

        for ch in text.chars() {
            let id = self.next_id();
            let stamp = Stamp::new(id.seq, &self.replica_id);
            let node = TextNode {
                id: id.clone(),
                ch,
                origin: origin.clone(),
                deleted: false,
                attrs: registers_for(attrs, &stamp),
            };
            let record = InsertRecord {
                id: id.clone(),
                ch,
                origin,
                attrs: node.attrs.clone().into_iter().collect(),
            };
            self.integrate_node(node);
            self.record().inserts.push(record);
            origin = id;
        }

        self.emit(TextChange::Inserted {
            position,
            text: text.to_string(),
            attrs: attrs.clone(),
        });
        Ok(())
    }

    /// Delete `length` characters starting at `start`.
    pub fn delete(&mut self, start: usize, length: usize) -> Result<()> {
        self.check_range(start, length)?;
        if length == 0 {
            return Ok(());
        }

        let ids = self.ids_in_range(start, length)?;
        let mut removed = Vec::new();
        for id in &ids {
            if let Some(node) = self.nodes.get_mut(id) {
                node.deleted = true;
                let attrs = node.attributes();
                push_char(&mut removed, node.ch, &attrs);
            }
        }
        self.record().deletes.extend(ids);

        self.emit(TextChange::Deleted {
            position: start,
            removed,
        });
        Ok(())
    }

    /// Apply an attribute patch to `length` characters starting at `start`.
    pub fn format(&mut self, start: usize, length: usize, patch: &AttrPatch) -> Result<()> {
        self.check_range(start, length)?;
        if length == 0 || patch.is_empty() {
            return Ok(());
        }

        let ids = self.ids_in_range(start, length)?;
        let patch = normalize_patch(patch);
        let stamp = Stamp::new(self.tick(), &self.replica_id);
        let mut prior = Vec::new();
        for id in &ids {
            self.write_registers(id, &patch, &stamp, &mut prior);
        }

        self.emit(TextChange::Formatted {
            position: start,
            length,
            patch,
            prior,
        });
        Ok(())
    }

    /// Apply an attribute patch to specific characters. Characters deleted or
    /// unknown since the ids were captured are skipped. Returns how many
    /// characters were formatted.
    pub fn format_ids(&mut self, ids: &[TextId], patch: &AttrPatch) -> usize {
        let wanted: HashSet<&TextId> = ids.iter().collect();
        let targets: Vec<(usize, TextId)> = self
            .visible_ids()
            .enumerate()
            .filter(|(_, id)| wanted.contains(id))
            .map(|(pos, id)| (pos, id.clone()))
            .collect();
        if targets.is_empty() || patch.is_empty() {
            return 0;
        }

        let patch = normalize_patch(patch);
        let stamp = Stamp::new(self.tick(), &self.replica_id);
        for (position, id) in &targets {
            let mut prior = Vec::new();
            self.write_registers(id, &patch, &stamp, &mut prior);
            self.emit(TextChange::Formatted {
                position: *position,
                length: 1,
                patch: patch.clone(),
                prior,
            });
        }
        targets.len()
    }

    fn write_registers(&mut self, id: &TextId, patch: &AttrPatch, stamp: &Stamp, prior: &mut Vec<Run>) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        push_char(prior, node.ch, &node.attributes());

        let mut formats = Vec::with_capacity(patch.len());
        for (key, value) in patch {
            let register = node
                .attrs
                .entry(key.clone())
                .or_insert_with(LwwRegister::default);
            register.set(value.clone(), stamp.clone());
            formats.push(FormatRecord {
                id: id.clone(),
                key: key.clone(),
                register: register.clone(),
            });
        }
        self.record().formats.extend(formats);
    }

    /// Replace a range with new text carrying the inherited attributes.
    pub fn replace(&mut self, start: usize, end: usize, text: &str) -> Result<()> {
        let attrs = self.inherited_attributes(start);
        self.delete(start, end.saturating_sub(start))?;
        self.insert_with(start, text, &attrs)
    }

    /// Re-apply a recorded change (used for undo/redo).
    pub fn apply_change(&mut self, change: &TextChange) -> Result<()> {
        match change {
            TextChange::Inserted {
                position,
                text,
                attrs,
            } => self.insert_with(*position, text, attrs),
            TextChange::Deleted { position, .. } => self.delete(*position, change.len()),
            TextChange::Formatted {
                position,
                length,
                patch,
                ..
            } => self.format(*position, *length, patch),
        }
    }

    // === Queries ===

    /// Get the text as a String.
    pub fn to_string(&self) -> String {
        self.iter().collect()
    }

    /// Number of visible characters.
    pub fn len(&self) -> usize {
        self.nodes.values().filter(|n| !n.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn char_at(&self, position: usize) -> Option<char> {
        self.iter().nth(position)
    }

    /// Substring between two character positions.
    pub fn slice(&self, start: usize, end: usize) -> String {
        self.iter().skip(start).take(end.saturating_sub(start)).collect()
    }

    /// Iterate over visible characters.
    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        self.iter_nodes().filter(|n| !n.deleted).map(|n| n.ch)
    }

    /// Attributes of the character at `position`.
    pub fn attributes_at(&self, position: usize) -> Option<Attributes> {
        self.iter_nodes()
            .filter(|n| !n.deleted)
            .nth(position)
            .map(TextNode::attributes)
    }

    /// The attributes naive insertion at `position` would inherit: those of
    /// the character to the left, or none at the start of the text.
    pub fn inherited_attributes(&self, position: usize) -> Attributes {
        position
            .checked_sub(1)
            .and_then(|left| self.attributes_at(left))
            .unwrap_or_default()
    }

    /// The visible text as maximal runs of identical attributes.
    pub fn runs(&self) -> Vec<Run> {
        let mut runs = Vec::new();
        for node in self.iter_nodes().filter(|n| !n.deleted) {
            push_char(&mut runs, node.ch, &node.attributes());
        }
        runs
    }

    /// Runs covering `[start, end)`.
    pub fn slice_runs(&self, start: usize, end: usize) -> Vec<Run> {
        let mut runs = Vec::new();
        for node in self
            .iter_nodes()
            .filter(|n| !n.deleted)
            .skip(start)
            .take(end.saturating_sub(start))
        {
            push_char(&mut runs, node.ch, &node.attributes());
        }
        runs
    }

    /// The document as a delta of attributed inserts.
    pub fn to_delta(&self) -> Vec<DeltaOp> {
        self.runs().into_iter().map(DeltaOp::from).collect()
    }

    fn id_at_index(&self, index: usize) -> Option<TextId> {
        self.visible_ids().nth(index).cloned()
    }

    /// Current positions of those of `ids` that are visible.
    fn visible_positions(&self, ids: &HashSet<TextId>) -> HashMap<TextId, usize> {
        if ids.is_empty() {
            return HashMap::new();
        }
        self.visible_ids()
            .enumerate()
            .filter(|(_, id)| ids.contains(*id))
            .map(|(position, id)| (id.clone(), position))
            .collect()
    }

    fn visible_ids(&self) -> impl Iterator<Item = &TextId> + '_ {
        self.iter_nodes().filter(|n| !n.deleted).map(|n| &n.id)
    }

    /// Ids of the visible characters in `[start, start + length)`.
    pub fn ids_in_range(&self, start: usize, length: usize) -> Result<Vec<TextId>> {
        self.check_range(start, length)?;
        Ok(self.visible_ids().skip(start).take(length).cloned().collect())
    }

    /// Ids and attributes of the visible characters in `[start, start + length)`.
    pub fn entries(&self, start: usize, length: usize) -> Result<Vec<(TextId, Attributes)>> {
        self.check_range(start, length)?;
        Ok(self
            .iter_nodes()
            .filter(|n| !n.deleted)
            .skip(start)
            .take(length)
            .map(|n| (n.id.clone(), n.attributes()))
            .collect())
    }

    /// Convert a TextId to a visible position.
    pub fn id_to_position(&self, id: &TextId) -> Option<usize> {
        self.visible_ids().position(|i| i == id)
    }

    /// Convert a visible position to a TextId.
    pub fn position_to_id(&self, position: usize) -> Option<TextId> {
        self.id_at_index(position)
    }

    /// Iterate over all nodes, tombstones included, in document order.
    fn iter_nodes(&self) -> impl Iterator<Item = &TextNode> + '_ {
        TextIterator {
            text: self,
            stack: vec![TextId::genesis()],
            visited: HashSet::new(),
        }
    }

    /// Integrate a node into the tree.
    fn integrate_node(&mut self, node: TextNode) {
        let id = node.id.clone();
        let origin = node.origin.clone();
        self.observe_clock(id.seq);

        self.nodes.insert(id.clone(), node);

        // Siblings are kept in descending ID order
        let children = self.children.entry(origin).or_default();
        let pos = children
            .iter()
            .position(|c| c < &id)
            .unwrap_or(children.len());
        children.insert(pos, id.clone());

        self.children.entry(id).or_default();
    }

    fn knows(&self, id: &TextId) -> bool {
        id.is_genesis() || self.nodes.contains_key(id)
    }

    // === Replication ===

    /// Take the ops produced locally since the last call.
    pub fn take_update(&mut self) -> Option<TextUpdate> {
        self.pending_update.take()
    }

    /// Drain the change feed.
    pub fn take_events(&mut self) -> Vec<TextEvent> {
        std::mem::take(&mut self.events)
    }

    /// True if some received ops are still waiting for their dependencies.
    pub fn has_stalled(&self) -> bool {
        !self.stalled.is_empty()
    }

    /// The whole replica state as one update. Applying it to any replica
    /// joins the two states.
    pub fn state_update(&self) -> TextUpdate {
        let mut update = TextUpdate::new();
        for node in self.iter_nodes() {
            update.inserts.push(InsertRecord {
                id: node.id.clone(),
                ch: node.ch,
                origin: node.origin.clone(),
                attrs: node.attrs.clone().into_iter().collect(),
            });
            if node.deleted {
                update.deletes.push(node.id.clone());
            }
        }
        update.extend(self.stalled.clone());
        update
    }

    pub fn encode_state(&self) -> Result<Vec<u8>> {
        self.state_update().encode()
    }

    /// Apply ops from another replica, emitting events tagged `origin`.
    ///
    /// Ops referencing characters not yet known are parked and retried on
    /// every later call.
    pub fn apply_update(&mut self, update: &TextUpdate, origin: Origin) {
        self.with_origin(origin, |text| {
            let mut queue = std::mem::take(&mut text.stalled);
            queue.extend(update.clone());

            loop {
                let before = queue.inserts.len() + queue.deletes.len() + queue.formats.len();
                queue = text.integrate_ready(queue);
                let after = queue.inserts.len() + queue.deletes.len() + queue.formats.len();
                if after == before || after == 0 {
                    break;
                }
            }

            if !queue.is_empty() {
                tracing::trace!(
                    inserts = queue.inserts.len(),
                    deletes = queue.deletes.len(),
                    formats = queue.formats.len(),
                    "parking ops with unknown dependencies"
                );
            }
            text.stalled = queue;
        });
    }

    /// Integrate every op whose dependencies are present; return the rest.
    ///
    /// Positions for the batch's events come from one walk of the sequence
    /// for the inserts and one for the deletes.
    fn integrate_ready(&mut self, queue: TextUpdate) -> TextUpdate {
        let mut rest = TextUpdate::new();

        let mut inserted = HashSet::new();
        let mut known = Vec::new();
        for record in queue.inserts {
            if self.nodes.contains_key(&record.id) {
                known.push(record);
            } else if self.knows(&record.origin) {
                let attrs: BTreeMap<_, _> = record.attrs.into_iter().collect();
                for register in attrs.values() {
                    self.observe_clock(register.stamp().lamport);
                }
                inserted.insert(record.id.clone());
                self.integrate_node(TextNode {
                    id: record.id,
                    ch: record.ch,
                    origin: record.origin,
                    deleted: false,
                    attrs,
                });
            } else {
                rest.inserts.push(record);
            }
        }

        // Ascending final positions replay the batch in a valid order.
        let mut placed: Vec<_> = self.visible_positions(&inserted).into_iter().collect();
        placed.sort_by_key(|(_, position)| *position);
        for (id, position) in placed {
            if let Some(node) = self.nodes.get(&id) {
                let change = TextChange::Inserted {
                    position,
                    text: node.ch.to_string(),
                    attrs: node.attributes(),
                };
                self.emit(change);
            }
        }
        for record in known {
            for (key, register) in record.attrs {
                self.merge_register(&record.id, key, register);
            }
        }

        let mut doomed = HashSet::new();
        for id in queue.deletes {
            match self.nodes.get(&id) {
                Some(node) if !node.deleted => {
                    doomed.insert(id);
                }
                Some(_) => {}
                None => rest.deletes.push(id),
            }
        }

        // Each earlier removal shifts the later positions left by one.
        let mut removed: Vec<_> = self.visible_positions(&doomed).into_iter().collect();
        removed.sort_by_key(|(_, position)| *position);
        for (shift, (id, position)) in removed.into_iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.deleted = true;
                let run = Run::new(node.ch.to_string(), node.attributes());
                self.emit(TextChange::Deleted {
                    position: position - shift,
                    removed: vec![run],
                });
            }
        }

        for record in queue.formats {
            if self.nodes.contains_key(&record.id) {
                self.merge_register(&record.id, record.key, record.register);
            } else {
                rest.formats.push(record);
            }
        }

        rest
    }

    /// Join a remote register into a node, emitting a format event when the
    /// visible attributes change.
    fn merge_register(&mut self, id: &TextId, key: AttrKey, register: AttrRegister) {
        self.observe_clock(register.stamp().lamport);
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let before = node.attributes();
        let slot = node
            .attrs
            .entry(key.clone())
            .or_insert_with(LwwRegister::default);
        let won = slot.set(register.get().clone(), register.stamp().clone());
        if !won || node.deleted {
            return;
        }
        let ch = node.ch;
        let value = register.into_inner();
        if before.get(&key) == value.as_ref() {
            return;
        }
        if let Some(position) = self.id_to_position(id) {
            self.emit(TextChange::Formatted {
                position,
                length: 1,
                patch: AttrPatch::from([(key, value)]),
                prior: vec![Run::new(ch.to_string(), before)],
            });
        }
    }
}

/// Iterator for traversing text nodes in order.
struct TextIterator<'a> {
    text: &'a RGAText,
    stack: Vec<TextId>,
    visited: HashSet<TextId>,
}

impl<'a> Iterator for TextIterator<'a> {
    type Item = &'a TextNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if !self.visited.insert(id.clone()) {
                continue;
            }

            // Push children in reverse so the highest id is visited first
            if let Some(children) = self.text.children.get(&id) {
                for child in children.iter().rev() {
                    if !self.visited.contains(child) {
                        self.stack.push(child.clone());
                    }
                }
            }

            if !id.is_genesis() {
                if let Some(node) = self.text.nodes.get(&id) {
                    return Some(node);
                }
            }
        }
        None
    }
}

impl std::fmt::Display for RGAText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string())
    }
}

/// Two texts are equal when their visible content and attributes match.
impl PartialEq for RGAText {
    fn eq(&self, other: &Self) -> bool {
        self.runs() == other.runs()
    }
}

impl Eq for RGAText {}

impl Lattice for RGAText {
    fn bottom() -> Self {
        Self::new("")
    }

    fn join(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.apply_update(&other.state_update(), Origin::Remote);
        result.events.clear();
        result
    }
}

impl Default for RGAText {
    fn default() -> Self {
        Self::new("")
    }
}
