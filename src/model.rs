use serde::Serialize;
use std::fmt;

/// Open-ended file classification. New parser inputs map to `Other` without
/// a schema change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileKind {
    PageTemplate,
    ClassSource,
    MappingFile,
    Other(String),
}

impl FileKind {
    pub fn as_str(&self) -> &str {
        match self {
            FileKind::PageTemplate => "page-template",
            FileKind::ClassSource => "class-source",
            FileKind::MappingFile => "mapping-file",
            FileKind::Other(s) => s.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "page-template" => FileKind::PageTemplate,
            "class-source" => FileKind::ClassSource,
            "mapping-file" => FileKind::MappingFile,
            other => FileKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed structural fact kinds. `Other` is the extension point for kinds
/// this engine does not interpret itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Unit,
    Method,
    Endpoint,
    SqlSelect,
    SqlInsert,
    SqlUpdate,
    SqlDelete,
    Table,
    Column,
    Other(String),
}

impl ComponentKind {
    pub fn as_str(&self) -> &str {
        match self {
            ComponentKind::Unit => "unit",
            ComponentKind::Method => "method",
            ComponentKind::Endpoint => "endpoint",
            ComponentKind::SqlSelect => "sql-select",
            ComponentKind::SqlInsert => "sql-insert",
            ComponentKind::SqlUpdate => "sql-update",
            ComponentKind::SqlDelete => "sql-delete",
            ComponentKind::Table => "table",
            ComponentKind::Column => "column",
            ComponentKind::Other(s) => s.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "unit" => ComponentKind::Unit,
            "method" => ComponentKind::Method,
            "endpoint" => ComponentKind::Endpoint,
            "sql-select" => ComponentKind::SqlSelect,
            "sql-insert" => ComponentKind::SqlInsert,
            "sql-update" => ComponentKind::SqlUpdate,
            "sql-delete" => ComponentKind::SqlDelete,
            "table" => ComponentKind::Table,
            "column" => ComponentKind::Column,
            other => ComponentKind::Other(other.to_string()),
        }
    }

    pub fn is_sql_statement(&self) -> bool {
        matches!(
            self,
            ComponentKind::SqlSelect
                | ComponentKind::SqlInsert
                | ComponentKind::SqlUpdate
                | ComponentKind::SqlDelete
        )
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelKind {
    CallsMethod,
    CallsQuery,
    UsesTable,
    JoinsTable,
    ReferencesTable,
    PageCall,
    Other(String),
}

impl RelKind {
    pub fn as_str(&self) -> &str {
        match self {
            RelKind::CallsMethod => "calls-method",
            RelKind::CallsQuery => "calls-query",
            RelKind::UsesTable => "uses-table",
            RelKind::JoinsTable => "query-joins-table",
            RelKind::ReferencesTable => "query-references-table",
            RelKind::PageCall => "page-call",
            RelKind::Other(s) => s.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "calls-method" => RelKind::CallsMethod,
            "calls-query" => RelKind::CallsQuery,
            "uses-table" => RelKind::UsesTable,
            "query-joins-table" => RelKind::JoinsTable,
            "query-references-table" => RelKind::ReferencesTable,
            "page-call" => RelKind::PageCall,
            other => RelKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Architectural tier label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Layer {
    Presentation,
    Control,
    Service,
    Mapping,
    Database,
    Other(String),
}

impl Layer {
    pub fn as_str(&self) -> &str {
        match self {
            Layer::Presentation => "presentation",
            Layer::Control => "control",
            Layer::Service => "service",
            Layer::Mapping => "mapping",
            Layer::Database => "database",
            Layer::Other(s) => s.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "presentation" => Layer::Presentation,
            "control" => Layer::Control,
            "service" => Layer::Service,
            "mapping" => Layer::Mapping,
            "database" => Layer::Database,
            other => Layer::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Component {
    pub component_id: i64,
    pub file_id: i64,
    pub parent_id: Option<i64>,
    pub component_type: String,
    pub component_name: String,
    pub layer: String,
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        ComponentKind::parse(&self.component_type)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    pub relationship_id: i64,
    pub src_id: i64,
    pub dst_id: i64,
    pub rel_type: String,
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRow {
    pub file_id: i64,
    pub project_id: i64,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub content_hash: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassRow {
    pub class_id: i64,
    pub file_id: i64,
    pub class_name: String,
    pub has_error: bool,
    pub deleted: bool,
}

/// Decompressed literal statement text, lazily fetched from `sql_contents`.
#[derive(Debug, Clone)]
pub struct SqlContent {
    pub component_id: i64,
    pub file_id: i64,
    pub query_type: String,
    pub sql_text: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Analyzed,
    Skipped,
    Error,
    Removed,
}

/// Per-file outcome record emitted by the Ingestion Coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: String,
    pub status: FileStatus,
    pub components: usize,
    pub relationships: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct AnalyzeStats {
    pub scanned: usize,
    pub analyzed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub removed: usize,
    pub components: usize,
    pub relationships: usize,
    pub resolved_symbol_edges: usize,
    pub resolved_table_edges: usize,
    pub resolved_call_edges: usize,
    pub duration_ms: u64,
}

/// One row of chain output: entry -> method -> statement -> tables.
/// Missing hops stay `None`/empty rather than dropping the row, so report
/// consumers see coverage gaps instead of silent omission.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChainRow {
    pub entry_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_kind: Option<String>,
    pub table_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct LiveCounts {
    pub files: i64,
    pub classes: i64,
    pub components: i64,
    pub relationships: i64,
}

#[derive(Debug, Serialize)]
pub struct CleanupReport {
    pub scanned_endpoints: i64,
    pub removed_components: i64,
    pub removed_relationships: i64,
    pub before: LiveCounts,
    pub after: LiveCounts,
}

#[derive(Debug, Serialize)]
pub struct StoreOverview {
    pub db_path: String,
    pub projects: i64,
    pub counts: LiveCounts,
    pub sql_contents: i64,
    pub tables: i64,
}
