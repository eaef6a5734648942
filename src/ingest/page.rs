use crate::ingest::extract::{ComponentInput, ExtractedFacts, Extractor, FactRef};
use crate::model::{ComponentKind, Layer, RelKind};
use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

/// Extractor for page templates: one presentation unit per page plus
/// page-call references to the backend endpoints it targets.
pub struct PageExtractor;

impl PageExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn form_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<form\b[^>]*>").unwrap())
}

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\baction\s*=\s*["']([^"']+)["']"#).unwrap())
}

fn form_method_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\bmethod\s*=\s*["'](\w+)["']"#).unwrap())
}

fn ajax_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"url\s*:\s*["']([^"']+)["']"#).unwrap())
}

impl Extractor for PageExtractor {
    fn extract(&self, rel_path: &str, source: &str) -> Result<ExtractedFacts> {
        let mut facts = ExtractedFacts::default();
        let unit = facts.push_component(ComponentInput::new(
            ComponentKind::Unit,
            rel_path.to_string(),
            Layer::Presentation,
        ));

        let mut seen = std::collections::HashSet::new();

        for form in form_re().find_iter(source) {
            let tag = form.as_str();
            let Some(action) = action_re().captures(tag) else {
                continue;
            };
            let verb = form_method_re()
                .captures(tag)
                .map(|c| c[1].to_uppercase())
                .unwrap_or_else(|| "GET".to_string());
            push_page_call(&mut facts, unit, &mut seen, &action[1], &verb);
        }

        for caps in ajax_url_re().captures_iter(source) {
            push_page_call(&mut facts, unit, &mut seen, &caps[1], "GET");
        }

        Ok(facts)
    }
}

fn push_page_call(
    facts: &mut ExtractedFacts,
    unit: usize,
    seen: &mut std::collections::HashSet<String>,
    raw_target: &str,
    verb: &str,
) {
    let Some(path) = normalize_target(raw_target) else {
        return;
    };
    let endpoint_name = format!("{path}:{verb}");
    if !seen.insert(endpoint_name.clone()) {
        return;
    }
    facts.link(
        RelKind::PageCall,
        FactRef::Local(unit),
        FactRef::Endpoint(endpoint_name),
    );
}

/// Dynamic or external targets cannot name an endpoint; only literal
/// in-application paths survive.
fn normalize_target(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.contains("${")
        || trimmed.contains("<%")
        || trimmed.starts_with("http://")
        || trimmed.starts_with("https://")
        || trimmed.starts_with('#')
        || trimmed.starts_with("javascript:")
    {
        return None;
    }
    let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    // Strip the common ".do"-style suffix so template targets line up with
    // annotation-declared paths.
    let path = path.strip_suffix(".do").unwrap_or(path);
    if path.is_empty() {
        return None;
    }
    Some(if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    })
}
