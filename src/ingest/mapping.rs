use crate::ingest::extract::{ComponentInput, ExtractedFacts, Extractor};
use crate::model::{ComponentKind, Layer};
use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

/// Extractor for XML SQL-mapping files: one structural unit per mapper
/// namespace, one SQL-statement component per statement tag, with the
/// literal body routed into the content store.
pub struct MappingExtractor;

impl MappingExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn namespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<(?:mapper|sqlMap)\b[^>]*\bnamespace\s*=\s*"([^"]+)""#).unwrap()
    })
}

fn statement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?s)<(select|insert|update|delete)\b[^>]*\bid\s*=\s*"([^"]+)"[^>]*>(.*?)</(?:select|insert|update|delete)>"#,
        )
        .unwrap()
    })
}

fn inner_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

impl Extractor for MappingExtractor {
    fn extract(&self, rel_path: &str, source: &str) -> Result<ExtractedFacts> {
        let mut facts = ExtractedFacts::default();

        let namespace = namespace_re()
            .captures(source)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| crate::util::file_name(rel_path));

        let unit = facts.push_component(ComponentInput::new(
            ComponentKind::Unit,
            namespace.clone(),
            Layer::Mapping,
        ));

        for caps in statement_re().captures_iter(source) {
            let tag = &caps[1];
            let id = &caps[2];
            let body = flatten_body(&caps[3]);
            let kind = match tag {
                "select" => ComponentKind::SqlSelect,
                "insert" => ComponentKind::SqlInsert,
                "update" => ComponentKind::SqlUpdate,
                "delete" => ComponentKind::SqlDelete,
                _ => unreachable!(),
            };
            let name = format!("{namespace}.{id}");
            facts.push_component(
                ComponentInput::new(kind, name, Layer::Mapping)
                    .child_of(unit)
                    .with_sql(tag, body),
            );
        }

        Ok(facts)
    }
}

/// Statement bodies may contain dynamic-SQL tags and line comments; strip
/// both before collapsing whitespace. Comments must go while line structure
/// still exists, or a commented-out clause would re-enter the flattened text
/// the resolver pattern-matches against.
fn flatten_body(raw: &str) -> String {
    let stripped = inner_tag_re().replace_all(raw, " ");
    let mut text = String::with_capacity(stripped.len());
    for line in stripped.lines() {
        let line = line.split_once("--").map_or(line, |(head, _)| head);
        text.push_str(line);
        text.push(' ');
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
<mapper namespace="orderMapper">
  <select id="selectOrders" resultType="map">
    SELECT * FROM ORDERS
    <where>
      <if test="status != null">STATUS = #{status}</if>
    </where>
  </select>
  <insert id="insertOrder">
    INSERT INTO ORDERS (ID) VALUES (#{id})
  </insert>
</mapper>
"#;

    #[test]
    fn extracts_namespace_and_statements() {
        let facts = MappingExtractor::new().extract("sql/order.xml", SAMPLE).unwrap();
        let names: Vec<_> = facts
            .components
            .iter()
            .map(|c| (c.kind.as_str(), c.name.as_str()))
            .collect();
        assert!(names.contains(&("unit", "orderMapper")));
        assert!(names.contains(&("sql-select", "orderMapper.selectOrders")));
        assert!(names.contains(&("sql-insert", "orderMapper.insertOrder")));
    }

    #[test]
    fn statement_bodies_are_flattened() {
        let facts = MappingExtractor::new().extract("sql/order.xml", SAMPLE).unwrap();
        let select = facts
            .components
            .iter()
            .find(|c| c.name == "orderMapper.selectOrders")
            .unwrap();
        let sql = select.sql.as_ref().unwrap();
        assert_eq!(sql.query_type, "select");
        assert!(sql.text.starts_with("SELECT * FROM ORDERS"));
        assert!(!sql.text.contains('<'));
    }

    #[test]
    fn line_comments_do_not_survive_flattening() {
        let xml = r#"<mapper namespace="m">
  <select id="s">
    SELECT * FROM ORDERS
    -- FROM ORDERS_BAK
    WHERE ID = #{id}
  </select>
</mapper>"#;
        let facts = MappingExtractor::new().extract("sql/m.xml", xml).unwrap();
        let select = facts.components.iter().find(|c| c.name == "m.s").unwrap();
        let sql = select.sql.as_ref().unwrap();
        assert_eq!(sql.text, "SELECT * FROM ORDERS WHERE ID = #{id}");
    }

    #[test]
    fn statements_hang_off_the_namespace_unit() {
        let facts = MappingExtractor::new().extract("sql/order.xml", SAMPLE).unwrap();
        let select = facts
            .components
            .iter()
            .find(|c| c.name == "orderMapper.selectOrders")
            .unwrap();
        assert_eq!(select.parent, Some(0));
    }
}
