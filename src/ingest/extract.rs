use crate::model::{ComponentKind, Layer, RelKind};
use anyhow::Result;

/// How a relationship input names its endpoints before ids exist.
///
/// `Local` resolves within the file's own component list; the symbolic
/// variants resolve against live components already committed to the store,
/// which is why the coordinator ingests mapping files before class sources
/// and class sources before page templates.
#[derive(Debug, Clone)]
pub enum FactRef {
    Local(usize),
    Statement(String),
    Endpoint(String),
}

#[derive(Debug, Clone)]
pub struct SqlBody {
    pub query_type: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ComponentInput {
    pub kind: ComponentKind,
    pub name: String,
    pub layer: Layer,
    /// Index of the parent component in the same extraction, which must
    /// appear earlier in the list.
    pub parent: Option<usize>,
    pub sql: Option<SqlBody>,
}

impl ComponentInput {
    pub fn new(kind: ComponentKind, name: impl Into<String>, layer: Layer) -> Self {
        Self {
            kind,
            name: name.into(),
            layer,
            parent: None,
            sql: None,
        }
    }

    pub fn child_of(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_sql(mut self, query_type: impl Into<String>, text: impl Into<String>) -> Self {
        self.sql = Some(SqlBody {
            query_type: query_type.into(),
            text: text.into(),
        });
        self
    }
}

#[derive(Debug, Clone)]
pub struct RelationshipInput {
    pub kind: RelKind,
    pub src: FactRef,
    pub dst: FactRef,
}

/// Everything an extractor produces for one file. Pure data; the store
/// assigns identity when the generation is committed.
#[derive(Debug, Default, Clone)]
pub struct ExtractedFacts {
    pub class_name: Option<String>,
    pub components: Vec<ComponentInput>,
    pub relationships: Vec<RelationshipInput>,
}

impl ExtractedFacts {
    pub fn push_component(&mut self, component: ComponentInput) -> usize {
        self.components.push(component);
        self.components.len() - 1
    }

    pub fn link(&mut self, kind: RelKind, src: FactRef, dst: FactRef) {
        self.relationships.push(RelationshipInput { kind, src, dst });
    }
}

/// Capability contract for per-file-type extractors: a pure, stateless
/// function from file content to structural facts.
pub trait Extractor: Send {
    fn extract(&self, rel_path: &str, source: &str) -> Result<ExtractedFacts>;
}
