//! Character attributes and track-changes attribution.
//!
//! Every character in the text carries an attribute set. Two keys are
//! special: [`AttrKey::TrackInsert`] and [`AttrKey::TrackDelete`] hold an
//! [`Attribution`] naming who proposed the insertion or deletion and when.
//! A character carries at most one of the two.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who proposed a tracked change, and when (milliseconds since the epoch).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Attribution {
    pub author_id: String,
    pub author_name: String,
    pub author_color: Option<String>,
    pub timestamp: i64,
}

impl Attribution {
    pub fn new(author_id: impl Into<String>, author_name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            author_id: author_id.into(),
            author_name: author_name.into(),
            author_color: None,
            timestamp,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.author_color = Some(color.into());
        self
    }
}

/// Attribute names.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttrKey {
    /// Proposed insertion awaiting review.
    TrackInsert,
    /// Proposed deletion awaiting review.
    TrackDelete,
    Bold,
    Italic,
    /// Extension point for formatting the review layer does not interpret.
    Custom(String),
}

impl AttrKey {
    pub fn is_tracking(&self) -> bool {
        matches!(self, AttrKey::TrackInsert | AttrKey::TrackDelete)
    }

    /// The tracking key that must be cleared whenever `self` is set.
    fn exclusive_partner(&self) -> Option<AttrKey> {
        match self {
            AttrKey::TrackInsert => Some(AttrKey::TrackDelete),
            AttrKey::TrackDelete => Some(AttrKey::TrackInsert),
            _ => None,
        }
    }
}

/// Attribute values.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttrValue {
    Attribution(Attribution),
    Flag(bool),
    Text(String),
}

/// A change to attributes: `Some` sets a key, `None` clears it.
pub type AttrPatch = BTreeMap<AttrKey, Option<AttrValue>>;

/// The attributes present on a character or run.
///
/// Serialized as a list of pairs, since `Custom` keys are not valid JSON
/// object keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    into = "Vec<(AttrKey, AttrValue)>",
    from = "Vec<(AttrKey, AttrValue)>"
)]
pub struct Attributes(BTreeMap<AttrKey, AttrValue>);

impl Attributes {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, key: AttrKey, value: AttrValue) -> Self {
        self.set(key, value);
        self
    }

    /// Attributes for text proposed by `attribution`.
    pub fn tracked_insert(attribution: Attribution) -> Self {
        Self::new().with(AttrKey::TrackInsert, AttrValue::Attribution(attribution))
    }

    /// Attributes for text proposed for deletion by `attribution`.
    pub fn tracked_delete(attribution: Attribution) -> Self {
        Self::new().with(AttrKey::TrackDelete, AttrValue::Attribution(attribution))
    }

    /// Set a key. Setting one tracking key removes the other.
    pub fn set(&mut self, key: AttrKey, value: AttrValue) {
        if let Some(partner) = key.exclusive_partner() {
            self.0.remove(&partner);
        }
        self.0.insert(key, value);
    }

    pub fn remove(&mut self, key: &AttrKey) -> Option<AttrValue> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &AttrKey) -> Option<&AttrValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &AttrKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttrKey, &AttrValue)> + '_ {
        self.0.iter()
    }

    pub fn track_insert(&self) -> Option<&Attribution> {
        match self.0.get(&AttrKey::TrackInsert) {
            Some(AttrValue::Attribution(a)) => Some(a),
            _ => None,
        }
    }

    pub fn track_delete(&self) -> Option<&Attribution> {
        match self.0.get(&AttrKey::TrackDelete) {
            Some(AttrValue::Attribution(a)) => Some(a),
            _ => None,
        }
    }

    /// These attributes without `trackInsert`/`trackDelete`.
    pub fn without_tracking(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !k.is_tracking())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Apply a patch in place.
    pub fn apply(&mut self, patch: &AttrPatch) {
        for (key, value) in normalize_patch(patch) {
            match value {
                Some(v) => {
                    self.0.insert(key, v);
                }
                None => {
                    self.0.remove(&key);
                }
            }
        }
    }

    /// The patch that puts the named keys back to their current values.
    pub fn restore_patch<'a>(&self, keys: impl IntoIterator<Item = &'a AttrKey>) -> AttrPatch {
        keys.into_iter()
            .map(|k| (k.clone(), self.0.get(k).cloned()))
            .collect()
    }
}

impl FromIterator<(AttrKey, AttrValue)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (AttrKey, AttrValue)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.set(k, v);
        }
        attrs
    }
}

impl From<Attributes> for Vec<(AttrKey, AttrValue)> {
    fn from(attrs: Attributes) -> Self {
        attrs.0.into_iter().collect()
    }
}

impl From<Vec<(AttrKey, AttrValue)>> for Attributes {
    fn from(pairs: Vec<(AttrKey, AttrValue)>) -> Self {
        pairs.into_iter().collect()
    }
}

/// Make a patch respect the tracking exclusivity: whenever it sets one
/// tracking key, the other is cleared by the same write.
pub fn normalize_patch(patch: &AttrPatch) -> AttrPatch {
    let mut out = patch.clone();
    for (key, value) in patch {
        if value.is_some() {
            if let Some(partner) = key.exclusive_partner() {
                match patch.get(&partner) {
                    // Both set: the insertion mark wins.
                    Some(Some(_)) if *key == AttrKey::TrackInsert => {
                        out.insert(partner, None);
                    }
                    Some(Some(_)) => {}
                    _ => {
                        out.insert(partner, None);
                    }
                }
            }
        }
    }
    out
}

/// Patch marking text as a proposed insertion.
pub fn mark_insert(attribution: Attribution) -> AttrPatch {
    normalize_patch(&AttrPatch::from([(
        AttrKey::TrackInsert,
        Some(AttrValue::Attribution(attribution)),
    )]))
}

/// Patch marking text as a proposed deletion.
pub fn mark_delete(attribution: Attribution) -> AttrPatch {
    normalize_patch(&AttrPatch::from([(
        AttrKey::TrackDelete,
        Some(AttrValue::Attribution(attribution)),
    )]))
}

/// Patch clearing a single key.
pub fn clear(key: AttrKey) -> AttrPatch {
    AttrPatch::from([(key, None)])
}
