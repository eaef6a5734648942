//! Clause-pattern table-name extraction over literal statement text.
//!
//! The contract is under-approximation: a name is only reported when it
//! appears in an outermost `INSERT INTO`, `UPDATE`, `FROM`, or `JOIN`
//! clause. References inside subquery bodies, inside `WITH`-bound auxiliary
//! queries, or in the second and later branches of a set combination are
//! deliberately not resolved; absence of a result means "unknown", not
//! "no dependency".

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TableRefs {
    /// Names from INSERT INTO / UPDATE / FROM clauses.
    pub used: Vec<String>,
    /// Names from JOIN clauses.
    pub joined: Vec<String>,
}

impl TableRefs {
    pub fn is_empty(&self) -> bool {
        self.used.is_empty() && self.joined.is_empty()
    }
}

const SET_OPERATORS: &[&str] = &["UNION", "EXCEPT", "INTERSECT", "MINUS"];

const KEYWORDS: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "BY", "CASE", "CROSS", "DELETE", "DESC", "DISTINCT", "ELSE", "END",
    "EXCEPT", "EXISTS", "FOR", "FROM", "FULL", "GROUP", "HAVING", "IN", "INNER", "INSERT",
    "INTERSECT", "INTO", "IS", "JOIN", "LEFT", "LIKE", "LIMIT", "MINUS", "NOT", "NULL", "OFFSET",
    "ON", "OR", "ORDER", "OUTER", "RIGHT", "SELECT", "SET", "THEN", "UNION", "UPDATE", "USING",
    "VALUES", "WHEN", "WHERE", "WITH",
];

/// Terminates a FROM-clause table list.
const FROM_LIST_END: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "JOIN", "LEFT", "RIGHT", "INNER", "OUTER", "CROSS",
    "FULL", "ON", "SET", "LIMIT", "OFFSET", "UNION", "EXCEPT", "INTERSECT", "MINUS", "FOR",
    "CONNECT", "START",
];

pub fn extract_table_refs(sql: &str) -> TableRefs {
    let tokens = tokenize(sql);
    let mut refs = TableRefs::default();

    let mut depth: i32 = 0;
    let mut prev_top: Option<&str> = None;
    let mut in_from_list = false;
    let mut expect_table = false;
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i].as_str();
        match token {
            "(" => {
                depth += 1;
                // A parenthesis opens a subquery or column list; either way
                // the FROM list no longer continues at this level.
                in_from_list = false;
                expect_table = false;
                i += 1;
                continue;
            }
            ")" => {
                depth -= 1;
                i += 1;
                continue;
            }
            _ => {}
        }
        if depth != 0 {
            i += 1;
            continue;
        }

        // Only the first branch of a set combination is resolved.
        if SET_OPERATORS.contains(&token) {
            break;
        }

        if in_from_list {
            if token == "," {
                expect_table = true;
            } else if FROM_LIST_END.contains(&token) {
                in_from_list = false;
                expect_table = false;
                continue; // reprocess as a clause keyword
            } else if expect_table {
                if let Some(name) = table_ident(token) {
                    push_distinct(&mut refs.used, name);
                }
                expect_table = false;
            }
            prev_top = Some(tokens[i].as_str());
            i += 1;
            continue;
        }

        match token {
            "INTO" if prev_top == Some("INSERT") => {
                if let Some(name) = next_ident(&tokens, i + 1) {
                    push_distinct(&mut refs.used, name);
                }
            }
            "UPDATE" if prev_top != Some("FOR") => {
                if let Some(name) = next_ident(&tokens, i + 1) {
                    push_distinct(&mut refs.used, name);
                }
            }
            "FROM" => {
                in_from_list = true;
                expect_table = true;
            }
            "JOIN" => {
                if let Some(name) = next_ident(&tokens, i + 1) {
                    push_distinct(&mut refs.joined, name);
                }
            }
            _ => {}
        }
        prev_top = Some(tokens[i].as_str());
        i += 1;
    }

    refs
}

/// Upper-case, whitespace-normalize, and split; parentheses and commas are
/// their own tokens so nesting depth is visible. Line comments go first so a
/// commented-out clause never enters the token stream.
fn tokenize(sql: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(sql.len());
    for line in sql.lines() {
        let line = line.split_once("--").map_or(line, |(head, _)| head);
        cleaned.push_str(line);
        cleaned.push('\n');
    }
    let upper = cleaned.to_uppercase();
    let mut padded = String::with_capacity(upper.len() + 16);
    for ch in upper.chars() {
        match ch {
            '(' | ')' | ',' | ';' => {
                padded.push(' ');
                padded.push(ch);
                padded.push(' ');
            }
            _ => padded.push(ch),
        }
    }
    padded.split_whitespace().map(|s| s.to_string()).collect()
}

fn next_ident(tokens: &[String], at: usize) -> Option<String> {
    tokens.get(at).and_then(|t| table_ident(t))
}

fn table_ident(token: &str) -> Option<String> {
    if KEYWORDS.contains(&token) {
        return None;
    }
    let mut chars = token.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '#')) {
        return None;
    }
    Some(token.to_string())
}

fn push_distinct(list: &mut Vec<String>, name: String) {
    if !list.contains(&name) {
        list.push(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_into_resolves_target_table() {
        let refs = extract_table_refs("INSERT INTO USERS (id) VALUES (1)");
        assert_eq!(refs.used, vec!["USERS"]);
        assert!(refs.joined.is_empty());
    }

    #[test]
    fn subquery_body_is_never_resolved() {
        let refs = extract_table_refs("SELECT * FROM (SELECT * FROM USERS) t");
        // {} or alias-only; the nested USERS must not leak out.
        assert!(!refs.used.contains(&"USERS".to_string()));
        assert!(refs.joined.is_empty());
    }

    #[test]
    fn from_list_collects_comma_separated_tables() {
        let refs = extract_table_refs("select a.id, b.id from orders a, order_items b where a.id = b.order_id");
        assert_eq!(refs.used, vec!["ORDERS", "ORDER_ITEMS"]);
    }

    #[test]
    fn join_variants_land_in_joined() {
        let refs = extract_table_refs(
            "SELECT * FROM ORDERS O LEFT OUTER JOIN USERS U ON O.USER_ID = U.ID INNER JOIN ITEMS I ON I.ORDER_ID = O.ID",
        );
        assert_eq!(refs.used, vec!["ORDERS"]);
        assert_eq!(refs.joined, vec!["USERS", "ITEMS"]);
    }

    #[test]
    fn update_resolves_target_but_for_update_does_not() {
        let refs = extract_table_refs("UPDATE ORDERS SET STATUS = 'X' WHERE ID = 1");
        assert_eq!(refs.used, vec!["ORDERS"]);

        let refs = extract_table_refs("SELECT * FROM ORDERS WHERE ID = 1 FOR UPDATE");
        assert_eq!(refs.used, vec!["ORDERS"]);
    }

    #[test]
    fn later_union_branches_are_not_resolved() {
        let refs = extract_table_refs("SELECT ID FROM ORDERS UNION SELECT ID FROM ARCHIVED_ORDERS");
        assert_eq!(refs.used, vec!["ORDERS"]);
    }

    #[test]
    fn cte_bodies_are_not_resolved() {
        let refs = extract_table_refs(
            "WITH RECENT AS (SELECT * FROM ORDERS WHERE TS > 0) SELECT * FROM RECENT",
        );
        // The auxiliary body stays opaque; only the depth-0 reference to the
        // binding name itself is visible.
        assert!(!refs.used.contains(&"ORDERS".to_string()));
    }

    #[test]
    fn delete_from_resolves_target() {
        let refs = extract_table_refs("DELETE FROM ORDERS WHERE ID = #{id}");
        assert_eq!(refs.used, vec!["ORDERS"]);
    }

    #[test]
    fn bind_markers_are_not_tables() {
        let refs = extract_table_refs("SELECT * FROM #{tbl}");
        assert!(refs.is_empty());
    }

    #[test]
    fn commented_out_clauses_are_not_resolved() {
        let refs = extract_table_refs(
            "SELECT * FROM ORDERS\n-- FROM OLD_ORDERS\nWHERE ID = 1 -- JOIN USERS",
        );
        assert_eq!(refs.used, vec!["ORDERS"]);
        assert!(refs.joined.is_empty());
    }

    #[test]
    fn unmatched_clause_is_empty_not_error() {
        assert!(extract_table_refs("TRUNCATE TABLE ORDERS").is_empty());
        assert!(extract_table_refs("").is_empty());
    }
}
