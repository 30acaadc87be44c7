//! Shared test domain: a tiny dictionary.
//!
//! `language` and `concept` stand alone; a `word` belongs to a language; a
//! `connection` joins a word to a concept.

#![allow(dead_code)]

use std::sync::Once;

use retrace::{
    ActorId, Engine, FieldSpec, MemoryStore, ObjectId, ObjectRecord, TypeManifest, TypeName,
};

static TRACING: Once = Once::new();

/// Routes engine logs through `RUST_LOG` when set.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn actor(name: &str) -> ActorId {
    ActorId::new(name).unwrap()
}

pub fn type_name(name: &str) -> TypeName {
    TypeName::new(name).unwrap()
}

pub fn language_manifest() -> TypeManifest {
    TypeManifest::new(type_name("language"), vec![FieldSpec::scalar("code")])
}

pub fn word_manifest() -> TypeManifest {
    TypeManifest::new(
        type_name("word"),
        vec![FieldSpec::scalar("full"), FieldSpec::foreign_key("language")],
    )
}

pub fn concept_manifest() -> TypeManifest {
    TypeManifest::new(type_name("concept"), vec![FieldSpec::scalar("notes")])
}

pub fn connection_manifest() -> TypeManifest {
    TypeManifest::new(
        type_name("connection"),
        vec![
            FieldSpec::foreign_key("word"),
            FieldSpec::foreign_key("concept"),
        ],
    )
}

pub fn manifests() -> Vec<TypeManifest> {
    vec![
        language_manifest(),
        word_manifest(),
        concept_manifest(),
        connection_manifest(),
    ]
}

/// Engine over an in-memory store with the dictionary schema registered.
pub fn engine() -> Engine<MemoryStore> {
    init_tracing();
    let mut engine = Engine::new(MemoryStore::new());
    assert!(engine.register_schema(&manifests()));
    engine
}

pub fn language(code: &str) -> ObjectRecord {
    ObjectRecord::new(ObjectId::random(), type_name("language")).with("code", code)
}

pub fn word(full: &str, language: ObjectId) -> ObjectRecord {
    ObjectRecord::new(ObjectId::random(), type_name("word"))
        .with("full", full)
        .with("language", language)
}

pub fn concept(notes: &str) -> ObjectRecord {
    ObjectRecord::new(ObjectId::random(), type_name("concept")).with("notes", notes)
}

pub fn connection(word: ObjectId, concept: ObjectId) -> ObjectRecord {
    ObjectRecord::new(ObjectId::random(), type_name("connection"))
        .with("word", word)
        .with("concept", concept)
}
