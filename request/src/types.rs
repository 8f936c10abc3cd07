//! Domain types for keyed request state.
//!
//! The state held by the store has two halves:
//!
//! - **Records**: one [`KeyedRecord`] per caller-chosen [`KeyPath`], describing
//!   the lifecycle of the latest request made under that key. Records only
//!   change through a [`Mutation`].
//! - **Descriptors**: one [`RequestDescriptor`] per dedup slot, remembering the
//!   most recently issued request so a duplicate can cancel it.

use crate::config::DedupScope;
use chrono::{DateTime, Utc};
use fetchstate_core::params::Params;
use fetchstate_core::transport::{CancelHandle, HttpResponse, TransportError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// A path into the larger state tree that a record is stored under
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPath(String);

impl KeyPath {
    /// Creates a key path
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the path as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl std::fmt::Display for KeyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation id of a single issued request
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random `RequestId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `RequestId` from a UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a keyed record
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Nothing recorded yet, or cleared
    #[default]
    Absent,
    /// A request is in flight
    Loading,
    /// The latest outcome was a success
    Success,
    /// The latest outcome was a failure
    Error,
}

impl RecordStatus {
    /// Whether no status has been recorded
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Request lifecycle as seen under one key
///
/// Serializes with only the fields that have been set, so the empty record
/// is `{}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyedRecord {
    /// Current status
    #[serde(default, skip_serializing_if = "RecordStatus::is_absent")]
    pub status: RecordStatus,
    /// Last successful response, without its request echo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resp: Option<HttpResponse>,
    /// Last failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<TransportError>,
    /// Set by the first success and never reset except by a clear
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub first_call_done: bool,
}

impl KeyedRecord {
    /// The empty record
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether a request is in flight
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self.status, RecordStatus::Loading)
    }

    /// Whether the latest outcome was a success
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, RecordStatus::Success)
    }

    /// Whether the latest outcome was a failure
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.status, RecordStatus::Error)
    }
}

/// The only ways a keyed record changes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    /// Mark the key as loading
    Begin {
        /// Target key
        key: KeyPath,
    },
    /// Record a success
    Succeed {
        /// Target key
        key: KeyPath,
        /// The response
        resp: HttpResponse,
    },
    /// Record a failure
    Fail {
        /// Target key
        key: KeyPath,
        /// The failure
        err: TransportError,
    },
    /// Reset the key to the empty record
    Clear {
        /// Target key
        key: KeyPath,
    },
}

impl Mutation {
    /// The key this mutation targets
    #[must_use]
    pub const fn key(&self) -> &KeyPath {
        match self {
            Self::Begin { key }
            | Self::Succeed { key, .. }
            | Self::Fail { key, .. }
            | Self::Clear { key } => key,
        }
    }

    /// Applies the mutation.
    ///
    /// Every variant except `Clear` keeps the record's other fields.
    pub fn apply(self, records: &mut BTreeMap<KeyPath, KeyedRecord>) {
        match self {
            Self::Begin { key } => {
                records.entry(key).or_default().status = RecordStatus::Loading;
            },
            Self::Succeed { key, resp } => {
                let record = records.entry(key).or_default();
                record.status = RecordStatus::Success;
                record.first_call_done = true;
                record.resp = Some(resp.redacted());
            },
            Self::Fail { key, err } => {
                let record = records.entry(key).or_default();
                record.status = RecordStatus::Error;
                record.err = Some(err);
            },
            Self::Clear { key } => {
                records.insert(key, KeyedRecord::empty());
            },
        }
    }
}

/// Lifecycle of the request a descriptor tracks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Nothing issued yet
    #[default]
    Idle,
    /// In flight
    Started,
    /// Completed
    Finished,
}

/// The most recently issued request of one dedup slot
#[derive(Clone, Debug, Default)]
pub struct RequestDescriptor {
    /// URL of the tracked request
    pub target_url: Option<String>,
    /// Parameters of the tracked request
    pub params: Params,
    /// Where the tracked request is in its lifecycle
    pub lifecycle: Lifecycle,
    /// Aborts the tracked request
    pub cancel: Option<CancelHandle>,
    /// Correlation id of the tracked request
    pub request_id: Option<RequestId>,
    /// When the tracked request was issued
    pub started_at: Option<DateTime<Utc>>,
}

impl RequestDescriptor {
    /// Whether a request for `url` with `params` duplicates the in-flight one.
    #[must_use]
    pub fn is_duplicate(&self, url: &str, params: &Params) -> bool {
        self.lifecycle == Lifecycle::Started
            && self.target_url.as_deref() == Some(url)
            && self.params.shallow_eq(params)
    }

    /// Start tracking a new request, returning the cancel handle of the previous one.
    pub fn start(
        &mut self,
        url: String,
        params: Params,
        cancel: CancelHandle,
        request_id: RequestId,
        now: DateTime<Utc>,
    ) -> Option<CancelHandle> {
        let previous = self.cancel.replace(cancel);
        self.target_url = Some(url);
        self.params = params;
        self.lifecycle = Lifecycle::Started;
        self.request_id = Some(request_id);
        self.started_at = Some(now);
        previous
    }

    /// Mark the tracked request finished if it is `request_id`.
    ///
    /// Returns when it started, or `None` if a newer request took over.
    pub fn finish(&mut self, request_id: &RequestId) -> Option<DateTime<Utc>> {
        if self.request_id.as_ref() != Some(request_id) {
            return None;
        }
        self.lifecycle = Lifecycle::Finished;
        self.started_at
    }

    /// Whether `request_id` is the request being tracked
    #[must_use]
    pub fn tracks(&self, request_id: &RequestId) -> bool {
        self.request_id.as_ref() == Some(request_id)
    }
}

/// Identifies the descriptor a request is deduplicated against
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DedupSlot {
    /// One descriptor shared by every key
    Global,
    /// One descriptor per key
    Key(KeyPath),
}

impl DedupSlot {
    /// The slot `key` maps to under `scope`
    #[must_use]
    pub fn for_key(scope: DedupScope, key: &KeyPath) -> Self {
        match scope {
            DedupScope::Global => Self::Global,
            DedupScope::PerKey => Self::Key(key.clone()),
        }
    }
}

/// State owned by the request store
#[derive(Clone, Debug, Default)]
pub struct RequestState {
    records: BTreeMap<KeyPath, KeyedRecord>,
    descriptors: HashMap<DedupSlot, RequestDescriptor>,
}

impl RequestState {
    /// Creates an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The record at `key`, or the empty record
    #[must_use]
    pub fn record(&self, key: &KeyPath) -> KeyedRecord {
        self.records.get(key).cloned().unwrap_or_default()
    }

    /// The record at `key`, if one was ever created
    #[must_use]
    pub fn get(&self, key: &KeyPath) -> Option<&KeyedRecord> {
        self.records.get(key)
    }

    /// Every record, ordered by key
    #[must_use]
    pub const fn records(&self) -> &BTreeMap<KeyPath, KeyedRecord> {
        &self.records
    }

    /// Applies a record mutation
    pub fn apply(&mut self, mutation: Mutation) {
        mutation.apply(&mut self.records);
    }

    /// The descriptor of `slot`, if a request was ever issued through it
    #[must_use]
    pub fn descriptor(&self, slot: &DedupSlot) -> Option<&RequestDescriptor> {
        self.descriptors.get(slot)
    }

    /// The descriptor of `slot`, created idle if missing
    pub fn descriptor_mut(&mut self, slot: DedupSlot) -> &mut RequestDescriptor {
        self.descriptors.entry(slot).or_default()
    }

    /// Mark `request_id` finished in `slot` if that descriptor still tracks it
    pub fn finish(&mut self, slot: &DedupSlot, request_id: &RequestId) -> Option<DateTime<Utc>> {
        self.descriptors
            .get_mut(slot)
            .and_then(|descriptor| descriptor.finish(request_id))
    }
}
