//! The document handle: one open file with its mediator, undo history and
//! deferred mutation queue.
//!
//! A `Document` is an owned value. The session hands it out as
//! `Arc<RwLock<Document>>`, one per open file; there is no global registry.
//!
//! Every local edit goes through [`Document::transact`], the synchronous
//! cycle. Attribute mutations the mediator asks for are queued and applied
//! by [`Document::run_deferred`] once that cycle has returned.

use crate::mediator::{EditChange, EditTransaction, Mediator, MediatorState, TextSelection, Verdict};
use crate::review::{decorations, Decoration, ReviewSummary};
use crate::watchdog::detect_duplication;
use redline_text::{
    mark_delete, mark_insert, tracked, AttrPatch, Attributes, Attribution, GroupId, Origin,
    RGAText, TextChange, TextError, TextEvent, TextId, TextUpdate, TrackedChange, UndoManager,
};
use std::collections::VecDeque;
use tokio::sync::broadcast;

/// Events emitted when a document changes.
#[derive(Clone, Debug)]
pub enum DocEvent {
    /// One change from the text's feed, tagged with its origin.
    Changed(TextEvent),
    /// The tracked-change list after a cycle that modified the text.
    TrackedChanges(Vec<TrackedChange>),
    /// The local selection moved.
    SelectionChanged(TextSelection),
    UndoStateChanged { can_undo: bool, can_redo: bool },
    /// Duplicated content was removed.
    Repaired { removed: usize },
    Closed,
}

/// The local user, as stamped on tracked changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}

impl Author {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn attribution(&self, timestamp: i64) -> Attribution {
        let attribution = Attribution::new(&self.id, &self.name, timestamp);
        match &self.color {
            Some(color) => attribution.with_color(color),
            None => attribution,
        }
    }
}

/// An attribute mutation waiting for the deferred pass.
///
/// The target characters are captured by id when the mutation is scheduled,
/// so remote edits that land in between cannot shift it onto other text.
#[derive(Clone, Debug)]
pub struct PendingMutation {
    pub position: usize,
    pub length: usize,
    pub patch: AttrPatch,
    ids: Vec<TextId>,
    /// Undo batch the mutation belongs to, if any.
    group: Option<GroupId>,
}

/// A collaborative document with track changes.
pub struct Document {
    id: String,
    text: RGAText,
    author: Author,
    mediator: Mediator,
    undo: UndoManager,
    deferred: VecDeque<PendingMutation>,
    /// Mutations produced by the current cycle, not yet queued.
    staged: Vec<PendingMutation>,
    /// Set while the document mutates itself (review actions, deferred
    /// marks, undo, repair); the change-feed observer ignores those cycles.
    review_guard: bool,
    /// Whether the cycle in progress should have its insertions marked.
    marking_inserts: bool,
    selection: Option<TextSelection>,
    live: bool,
    synced: bool,
    outbound: TextUpdate,
    event_tx: broadcast::Sender<DocEvent>,
}

impl Document {
    /// Create an empty document.
    pub fn new(
        id: impl Into<String>,
        replica_id: impl Into<String>,
        author: Author,
        track_changes: bool,
    ) -> Self {
        let id = id.into();
        let (event_tx, _) = broadcast::channel(100);
        Self {
            text: RGAText::new(replica_id),
            undo: UndoManager::new(&id),
            id,
            author,
            mediator: Mediator::new(track_changes),
            deferred: VecDeque::new(),
            staged: Vec::new(),
            review_guard: false,
            marking_inserts: false,
            selection: None,
            live: true,
            synced: false,
            outbound: TextUpdate::new(),
            event_tx,
        }
    }

    /// Create a document seeded with plain text. The seed is replayed, not
    /// recorded for undo, but is replicated like any other edit.
    pub fn with_text(
        id: impl Into<String>,
        replica_id: impl Into<String>,
        author: Author,
        track_changes: bool,
        content: &str,
    ) -> Self {
        let mut doc = Self::new(id, replica_id, author, track_changes);
        doc.review_guard = true;
        let seeded = doc
            .text
            .with_origin(Origin::Replay, |t| t.insert_with(0, content, &Attributes::new()));
        doc.review_guard = false;
        if let Err(e) = seeded {
            tracing::warn!(document = %doc.id, error = %e, "failed to seed document");
        }
        let events = doc.drain();
        doc.publish(events);
        doc
    }

    /// Restore a document from `encode_state` output.
    pub fn from_snapshot(
        id: impl Into<String>,
        replica_id: impl Into<String>,
        author: Author,
        track_changes: bool,
        snapshot: &[u8],
    ) -> Result<Self, TextError> {
        let update = TextUpdate::decode(snapshot)?;
        let mut doc = Self::new(id, replica_id, author, track_changes);
        doc.text.apply_update(&update, Origin::Replay);
        doc.text.take_events();
        Ok(doc)
    }

    // === Accessors ===

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn replica_id(&self) -> &str {
        self.text.replica_id()
    }

    pub fn text(&self) -> &RGAText {
        &self.text
    }

    pub fn content(&self) -> String {
        self.text.to_string()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_tracking(&self) -> bool {
        self.mediator.is_tracking()
    }

    pub fn set_tracking(&mut self, tracking: bool) {
        self.mediator.set_tracking(tracking);
    }

    pub fn mediator_state(&self) -> MediatorState {
        self.mediator.state()
    }

    pub fn selection(&self) -> Option<TextSelection> {
        self.selection
    }

    /// Number of mutations waiting for [`Document::run_deferred`].
    pub fn pending_mutations(&self) -> usize {
        self.deferred.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocEvent> {
        self.event_tx.subscribe()
    }

    // === Editing ===

    /// Record where the local selection is.
    pub fn set_selection(&mut self, selection: TextSelection) {
        let selection = selection.clamp(self.text.len());
        self.selection = Some(selection);
        let _ = self.event_tx.send(DocEvent::SelectionChanged(selection));
    }

    /// The synchronous cycle for one local edit: classify it, then apply it
    /// or turn it into a deletion proposal.
    ///
    /// Returns `None` if the edit was dropped because the document is closed
    /// or the edit does not fit the current text.
    pub fn transact(&mut self, tx: EditTransaction) -> Option<Verdict> {
        if !self.live {
            tracing::warn!(document = %self.id, "edit on closed document dropped");
            return None;
        }
        if let Err(e) = tx.validate(self.text.len()) {
            tracing::warn!(document = %self.id, error = %e, "out-of-range edit dropped");
            return None;
        }

        let verdict = self.mediator.classify(&tx, &self.text, self.selection);
        match &verdict {
            Verdict::PassThrough(_) => {
                self.pass_through(&tx, verdict.marks_insertions());
                if let Some(selection) = tx.selection {
                    self.set_selection(selection);
                }
            }
            Verdict::Redirect {
                ranges, selection, ..
            } => {
                for range in ranges {
                    self.schedule_delete_mark(range.start, range.end - range.start);
                }
                self.set_selection(*selection);
            }
        }
        self.mediator.settle();
        Some(verdict)
    }

    /// Apply the edit as-is, in descending `from` order so earlier changes
    /// keep their coordinates.
    fn pass_through(&mut self, tx: &EditTransaction, mark_inserts: bool) {
        let mut changes: Vec<&EditChange> = tx.changes.iter().filter(|c| !c.is_noop()).collect();
        changes.sort_by(|a, b| b.from.cmp(&a.from));

        self.marking_inserts = mark_inserts;
        let mut events = Vec::new();
        for change in changes {
            if let Err(e) = self.apply_edit(change) {
                tracing::warn!(document = %self.id, error = %e, "edit change dropped");
            }
            events.extend(self.drain());
        }
        self.marking_inserts = false;

        let changes = self.publish(events);
        let group = self.undo.record(Origin::Local, changes);
        for mut mutation in self.staged.drain(..) {
            mutation.group = group.clone();
            self.deferred.push_back(mutation);
        }
        self.notify_undo_state();
    }

    fn apply_edit(&mut self, change: &EditChange) -> Result<(), TextError> {
        if change.to > change.from {
            self.text.delete(change.from, change.to - change.from)?;
        }
        if !change.inserted.is_empty() {
            // Ordinary formatting is inherited, tracking marks never are.
            let attrs = self.text.inherited_attributes(change.from).without_tracking();
            self.text.insert_with(change.from, &change.inserted, &attrs)?;
        }
        Ok(())
    }

    fn schedule_delete_mark(&mut self, start: usize, length: usize) {
        let entries = match self.text.entries(start, length) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(document = %self.id, error = %e, "redirected range out of bounds");
                return;
            }
        };
        // Characters already proposed for deletion keep their attribution.
        let ids: Vec<TextId> = entries
            .into_iter()
            .filter(|(_, attrs)| attrs.track_delete().is_none())
            .map(|(id, _)| id)
            .collect();
        if ids.is_empty() {
            return;
        }
        self.deferred.push_back(PendingMutation {
            position: start,
            length,
            patch: mark_delete(self.attribution()),
            ids,
            group: None,
        });
    }

    /// Drain the deferred queue. Returns how many mutations changed the text.
    ///
    /// Mutations for a closed document are discarded.
    pub fn run_deferred(&mut self) -> usize {
        if self.deferred.is_empty() {
            return 0;
        }
        if !self.live {
            tracing::debug!(
                document = %self.id,
                dropped = self.deferred.len(),
                "document closed before deferred mutations ran"
            );
            self.deferred.clear();
            return 0;
        }

        let mut applied = 0;
        while let Some(mutation) = self.deferred.pop_front() {
            self.review_guard = true;
            let formatted = self.text.format_ids(&mutation.ids, &mutation.patch);
            self.review_guard = false;

            let events = self.drain();
            let changes = self.publish(events);
            if formatted == 0 {
                continue;
            }
            applied += 1;

            let joined = match &mutation.group {
                Some(group) => self.undo.record_into(group, changes.clone()),
                None => false,
            };
            if !joined {
                self.undo.record(Origin::Local, changes);
            }
            self.notify_undo_state();
        }
        applied
    }

    /// [`Document::transact`] followed by [`Document::run_deferred`], for
    /// callers without a scheduler turn in between.
    pub fn dispatch(&mut self, tx: EditTransaction) -> Option<Verdict> {
        let verdict = self.transact(tx);
        self.run_deferred();
        verdict
    }

    // === Review ===

    pub fn tracked_changes(&self) -> Vec<TrackedChange> {
        tracked::collect_tracked_changes(&self.text)
    }

    pub fn decorations(&self) -> Vec<Decoration> {
        decorations(&self.tracked_changes())
    }

    pub fn review_summary(&self) -> ReviewSummary {
        ReviewSummary::from_changes(&self.tracked_changes())
    }

    /// Accept a change by id. Unknown ids are ignored.
    pub fn accept_change(&mut self, id: &str) -> bool {
        self.review(|text| tracked::accept_change(text, id))
    }

    /// Reject a change by id. Unknown ids are ignored.
    pub fn reject_change(&mut self, id: &str) -> bool {
        self.review(|text| tracked::reject_change(text, id))
    }

    pub fn accept_all(&mut self) -> usize {
        self.review(tracked::accept_all)
    }

    pub fn reject_all(&mut self) -> usize {
        self.review(tracked::reject_all)
    }

    /// Run one review mutation as a single local undo batch.
    fn review<R: Default>(
        &mut self,
        f: impl FnOnce(&mut RGAText) -> Result<R, TextError>,
    ) -> R {
        if !self.live {
            return R::default();
        }
        self.review_guard = true;
        let result = f(&mut self.text);
        self.review_guard = false;

        let events = self.drain();
        let changes = self.publish(events);
        if self.undo.record(Origin::Local, changes).is_some() {
            self.notify_undo_state();
        }
        result.unwrap_or_else(|e| {
            tracing::warn!(document = %self.id, error = %e, "review action failed");
            R::default()
        })
    }

    // === Undo ===

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Undo the last local batch. Returns false if there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        if !self.live {
            return false;
        }
        let changes = self.undo.undo();
        self.replay(&changes)
    }

    /// Redo the last undone batch. Returns false if there was nothing to redo.
    pub fn redo(&mut self) -> bool {
        if !self.live {
            return false;
        }
        let changes = self.undo.redo();
        self.replay(&changes)
    }

    fn replay(&mut self, changes: &[TextChange]) -> bool {
        if changes.is_empty() {
            return false;
        }
        self.review_guard = true;
        let id = self.id.clone();
        self.text.with_origin(Origin::Replay, |text| {
            for change in changes {
                if let Err(e) = text.apply_change(change) {
                    tracing::warn!(document = %id, error = %e, "undo step no longer applies");
                }
            }
        });
        self.review_guard = false;

        let events = self.drain();
        self.publish(events);
        if let Some(selection) = self.selection {
            self.selection = Some(selection.clamp(self.text.len()));
        }
        self.notify_undo_state();
        true
    }

    fn notify_undo_state(&self) {
        let _ = self.event_tx.send(DocEvent::UndoStateChanged {
            can_undo: self.undo.can_undo(),
            can_redo: self.undo.can_redo(),
        });
    }

    // === Replication ===

    /// Apply an update received from a peer.
    pub fn apply_remote(&mut self, update: &[u8]) -> Result<(), TextError> {
        if !self.live {
            return Ok(());
        }
        let update = TextUpdate::decode(update)?;
        self.text.apply_update(&update, Origin::Remote);
        let events = self.drain();
        self.publish(events);
        if let Some(selection) = self.selection {
            self.selection = Some(selection.clamp(self.text.len()));
        }
        Ok(())
    }

    /// The full replica state, for snapshots and initial sync.
    pub fn encode_state(&self) -> Result<Vec<u8>, TextError> {
        self.text.encode_state()
    }

    /// Take the ops produced since the last call, encoded for the wire.
    pub fn take_outbound(&mut self) -> Result<Option<Vec<u8>>, TextError> {
        if self.outbound.is_empty() {
            return Ok(None);
        }
        let update = std::mem::take(&mut self.outbound);
        update.encode().map(Some)
    }

    /// Note that initial synchronization finished. Returns true the first
    /// time only.
    pub fn mark_synced(&mut self) -> bool {
        !std::mem::replace(&mut self.synced, true)
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Remove the second half of the text if it repeats the first half.
    /// Returns the number of characters removed.
    pub fn repair_duplication(&mut self, threshold: usize) -> Option<usize> {
        if !self.live {
            return None;
        }
        let half = detect_duplication(&self.text.to_string(), threshold)?;
        tracing::warn!(
            document = %self.id,
            removed = half,
            "duplicated content detected after sync, removing second half"
        );

        self.review_guard = true;
        let result = self
            .text
            .with_origin(Origin::Replay, |text| text.delete(half, half));
        self.review_guard = false;
        if let Err(e) = result {
            tracing::warn!(document = %self.id, error = %e, "duplication repair failed");
            return None;
        }

        let events = self.drain();
        self.publish(events);
        let _ = self.event_tx.send(DocEvent::Repaired { removed: half });
        Some(half)
    }

    /// Mark the document closed. Pending deferred mutations will be dropped.
    pub fn close(&mut self) {
        if std::mem::replace(&mut self.live, false) {
            let _ = self.event_tx.send(DocEvent::Closed);
        }
    }

    // === Change feed ===

    fn attribution(&self) -> Attribution {
        self.author
            .attribution(chrono::Utc::now().timestamp_millis())
    }

    /// Take the text's events and ops, running the observer over them.
    fn drain(&mut self) -> Vec<TextEvent> {
        let events = self.text.take_events();
        if let Some(update) = self.text.take_update() {
            self.outbound.extend(update);
        }
        self.observe(&events);
        events
    }

    /// Change-feed observer: insertions typed while tracking is on get an
    /// attribution mark staged for the deferred pass.
    fn observe(&mut self, events: &[TextEvent]) {
        if self.review_guard || !self.marking_inserts {
            return;
        }
        for event in events.iter().filter(|e| e.is_local()) {
            let TextChange::Inserted {
                position,
                text,
                attrs,
            } = &event.change
            else {
                continue;
            };
            if attrs.track_insert().is_some() {
                continue;
            }
            let length = text.chars().count();
            match self.text.ids_in_range(*position, length) {
                Ok(ids) => self.staged.push(PendingMutation {
                    position: *position,
                    length,
                    patch: mark_insert(self.attribution()),
                    ids,
                    group: None,
                }),
                Err(e) => {
                    tracing::warn!(document = %self.id, error = %e, "inserted range vanished")
                }
            }
        }
    }

    /// Broadcast a cycle's events. Returns the changes for undo recording.
    fn publish(&self, events: Vec<TextEvent>) -> Vec<TextChange> {
        if events.is_empty() {
            return Vec::new();
        }
        let changes = events.iter().map(|e| e.change.clone()).collect();
        for event in events {
            let _ = self.event_tx.send(DocEvent::Changed(event));
        }
        let _ = self
            .event_tx
            .send(DocEvent::TrackedChanges(self.tracked_changes()));
        changes
    }
}
