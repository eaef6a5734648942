use crate::ingest::extract::{ComponentInput, ExtractedFacts, Extractor, FactRef};
use crate::model::{ComponentKind, Layer, RelKind};
use anyhow::{Result, anyhow};
use regex::Regex;
use std::sync::OnceLock;

/// Extractor for class sources (controller/service/DAO layer): class name,
/// methods, declared endpoint mappings, and statement-id call sites.
pub struct ClassExtractor;

impl ClassExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:public\s+|final\s+|abstract\s+)*(?:class|interface)\s+(\w+)")
            .unwrap()
    })
}

fn method_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:public|protected|private)\s+[\w<>\[\],.\s]+?\s(\w+)\s*\(").unwrap()
    })
}

fn mapping_annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"@(Get|Post|Put|Delete|Patch|Request)Mapping\s*(?:\(\s*(?:value\s*=\s*)?"([^"]*)"[^)]*\))?"#,
        )
        .unwrap()
    })
}

fn request_method_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"method\s*=\s*RequestMethod\.(\w+)").unwrap())
}

fn query_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"\.\s*(?:selectList|selectOne|select|insert|update|delete|queryForList|queryForObject|queryForInt)\s*\(\s*"([^"]+)""#,
        )
        .unwrap()
    })
}

impl Extractor for ClassExtractor {
    fn extract(&self, rel_path: &str, source: &str) -> Result<ExtractedFacts> {
        let mut facts = ExtractedFacts::default();

        let class_name = class_re()
            .captures(source)
            .map(|c| c[1].to_string())
            .ok_or_else(|| anyhow!("no class declaration found in {rel_path}"))?;
        facts.class_name = Some(class_name.clone());

        let layer = layer_for_class(&class_name);
        let unit = facts.push_component(ComponentInput::new(
            ComponentKind::Unit,
            class_name.clone(),
            layer.clone(),
        ));

        // Class-level mapping gives every endpoint its path prefix.
        let class_body_start = class_re().find(source).map(|m| m.start()).unwrap_or(0);
        let base_path = mapping_annotation_re()
            .captures_iter(&source[..class_body_start])
            .last()
            .and_then(|c| c.get(2).map(|m| m.as_str().to_string()))
            .unwrap_or_default();

        // Method declarations with their offsets; annotations and call sites
        // attach to the nearest declaration around them.
        let methods: Vec<(usize, String)> = method_re()
            .captures_iter(source)
            .filter(|caps| caps.get(0).map(|m| m.start() >= class_body_start).unwrap_or(false))
            .map(|caps| {
                let m = caps.get(1).unwrap();
                (m.start(), m.as_str().to_string())
            })
            .collect();

        let mut method_indices: Vec<(usize, usize)> = Vec::new();
        for (offset, method_name) in &methods {
            let idx = facts.push_component(
                ComponentInput::new(
                    ComponentKind::Method,
                    format!("{class_name}.{method_name}"),
                    layer.clone(),
                )
                .child_of(unit),
            );
            method_indices.push((*offset, idx));
        }

        // Endpoint mappings: each annotation belongs to the next method
        // declared after it.
        for caps in mapping_annotation_re().captures_iter(source) {
            let at = caps.get(0).unwrap();
            if at.start() < class_body_start {
                continue;
            }
            let Some(&(_, method_idx)) = method_indices.iter().find(|(off, _)| *off > at.end())
            else {
                continue;
            };
            let verb = match &caps[1] {
                "Request" => request_method_re()
                    .captures(at.as_str())
                    .map(|c| c[1].to_uppercase())
                    .unwrap_or_else(|| "GET".to_string()),
                prefix => prefix.to_uppercase(),
            };
            let raw_path = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let path = join_paths(&base_path, raw_path);
            facts.push_component(
                ComponentInput::new(
                    ComponentKind::Endpoint,
                    format!("{path}:{verb}"),
                    Layer::Control,
                )
                .child_of(method_idx),
            );
        }

        // Statement-id call sites: method -> calls-query -> statement,
        // resolved symbolically against already-ingested mapping facts.
        for caps in query_call_re().captures_iter(source) {
            let at = caps.get(0).unwrap().start();
            let Some(&(_, method_idx)) = method_indices
                .iter()
                .rev()
                .find(|(off, _)| *off < at)
            else {
                continue;
            };
            facts.link(
                RelKind::CallsQuery,
                FactRef::Local(method_idx),
                FactRef::Statement(caps[1].to_string()),
            );
        }

        Ok(facts)
    }
}

fn layer_for_class(class_name: &str) -> Layer {
    if class_name.ends_with("Controller") {
        Layer::Control
    } else if class_name.ends_with("Service") || class_name.ends_with("ServiceImpl") {
        Layer::Service
    } else if class_name.ends_with("DAO")
        || class_name.ends_with("Dao")
        || class_name.ends_with("Mapper")
        || class_name.ends_with("Repository")
    {
        Layer::Mapping
    } else {
        Layer::Service
    }
}

fn join_paths(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim();
    if path.is_empty() {
        if base.is_empty() { "/".to_string() } else { base.to_string() }
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
