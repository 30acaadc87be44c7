//! Schema manifests and immutable snapshots.
//!
//! Tracked types declare a static field manifest. The registry turns the
//! manifests of every tracked type into timestamped, content-deduplicated
//! snapshots; reconstruction reads the snapshot valid at the view's time.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Moment;
use crate::identity::TypeName;

/// Whether a declared field is a scalar or a relation to another tracked
/// object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Scalar,
    ForeignKey,
}

/// One declared field of a tracked type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar,
        }
    }

    pub fn foreign_key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::ForeignKey,
        }
    }
}

/// Static field manifest for a tracked type, declared by the persistence
/// layer at startup. The identity field is implicit and never listed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeManifest {
    pub type_name: TypeName,
    pub fields: Vec<FieldSpec>,
}

impl TypeManifest {
    pub fn new(type_name: TypeName, fields: Vec<FieldSpec>) -> Self {
        Self { type_name, fields }
    }
}

/// Types that can declare their own manifest.
pub trait Describable {
    fn manifest() -> TypeManifest;
}

/// A type's field layout inside one snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSchema {
    pub fields: BTreeSet<String>,
    pub foreign_keys: BTreeSet<String>,
}

impl TypeSchema {
    fn from_manifest(manifest: &TypeManifest) -> Self {
        let mut schema = TypeSchema::default();
        for field in &manifest.fields {
            match field.kind {
                FieldKind::Scalar => schema.fields.insert(field.name.clone()),
                FieldKind::ForeignKey => schema.foreign_keys.insert(field.name.clone()),
            };
        }
        schema
    }

    pub fn is_foreign_key(&self, field: &str) -> bool {
        self.foreign_keys.contains(field)
    }

    /// Scalars first, then relations.
    pub fn all_fields(&self) -> impl Iterator<Item = &String> {
        self.fields.iter().chain(self.foreign_keys.iter())
    }
}

/// Immutable, timestamped snapshot of every tracked type's layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub valid_from: Moment,
    pub state: BTreeMap<TypeName, TypeSchema>,
}

impl SchemaSnapshot {
    pub fn schema_for(&self, type_name: &TypeName) -> Option<&TypeSchema> {
        self.state.get(type_name)
    }
}

/// Ordered snapshot sequence.
///
/// Appends are serialized through `&mut self` and content-deduplicated;
/// reads never block each other.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchemaRegistry {
    snapshots: Vec<SchemaSnapshot>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the current layout of every tracked type.
    ///
    /// No-ops and returns `None` when the computed state matches the latest
    /// snapshot.
    pub fn register(
        &mut self,
        manifests: &[TypeManifest],
        now: Moment,
    ) -> Option<&SchemaSnapshot> {
        let state: BTreeMap<TypeName, TypeSchema> = manifests
            .iter()
            .map(|m| (m.type_name.clone(), TypeSchema::from_manifest(m)))
            .collect();

        if self.snapshots.last().is_some_and(|last| last.state == state) {
            debug!("schema unchanged, no snapshot recorded");
            return None;
        }

        info!(types = state.len(), at = %now, "schema snapshot recorded");
        self.snapshots.push(SchemaSnapshot {
            valid_from: now,
            state,
        });
        self.snapshots.last()
    }

    /// Latest snapshot strictly older than `when`.
    pub fn snapshot_as_of(&self, when: Moment) -> Option<&SchemaSnapshot> {
        self.snapshots.iter().rev().find(|s| s.valid_from < when)
    }

    pub fn schema_as_of(&self, type_name: &TypeName, when: Moment) -> Option<&TypeSchema> {
        self.snapshot_as_of(when)
            .and_then(|snapshot| snapshot.schema_for(type_name))
    }

    pub fn latest(&self) -> Option<&SchemaSnapshot> {
        self.snapshots.last()
    }

    pub fn latest_schema(&self, type_name: &TypeName) -> Option<&TypeSchema> {
        self.latest().and_then(|snapshot| snapshot.schema_for(type_name))
    }

    pub fn snapshots(&self) -> &[SchemaSnapshot] {
        &self.snapshots
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
