use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

pub const SCHEMA_VERSION: i64 = 3;

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        BEGIN;
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS projects (
            project_id INTEGER PRIMARY KEY,
            project_name TEXT NOT NULL UNIQUE,
            root_path TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS files (
            file_id INTEGER PRIMARY KEY,
            project_id INTEGER NOT NULL,
            file_path TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_type TEXT NOT NULL,
            content_hash TEXT NOT NULL DEFAULT '',
            del_yn TEXT NOT NULL DEFAULT 'N',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(project_id, file_path),
            FOREIGN KEY(project_id) REFERENCES projects(project_id)
        );

        CREATE TABLE IF NOT EXISTS classes (
            class_id INTEGER PRIMARY KEY,
            file_id INTEGER NOT NULL,
            class_name TEXT NOT NULL,
            has_error INTEGER NOT NULL DEFAULT 0,
            del_yn TEXT NOT NULL DEFAULT 'N',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(file_id, class_name),
            FOREIGN KEY(file_id) REFERENCES files(file_id)
        );

        CREATE TABLE IF NOT EXISTS components (
            component_id INTEGER PRIMARY KEY,
            file_id INTEGER NOT NULL,
            parent_id INTEGER,
            component_type TEXT NOT NULL,
            component_name TEXT NOT NULL,
            layer TEXT NOT NULL DEFAULT '',
            del_yn TEXT NOT NULL DEFAULT 'N',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY(file_id) REFERENCES files(file_id)
        );

        CREATE INDEX IF NOT EXISTS idx_components_file ON components(file_id);
        CREATE INDEX IF NOT EXISTS idx_components_type_name
            ON components(component_type, component_name);

        CREATE TABLE IF NOT EXISTS relationships (
            relationship_id INTEGER PRIMARY KEY,
            src_id INTEGER NOT NULL,
            dst_id INTEGER NOT NULL,
            rel_type TEXT NOT NULL,
            del_yn TEXT NOT NULL DEFAULT 'N',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(src_id, dst_id, rel_type),
            CHECK(src_id <> dst_id),
            FOREIGN KEY(src_id) REFERENCES components(component_id),
            FOREIGN KEY(dst_id) REFERENCES components(component_id)
        );

        CREATE INDEX IF NOT EXISTS idx_relationships_src ON relationships(src_id);
        CREATE INDEX IF NOT EXISTS idx_relationships_dst ON relationships(dst_id);
        CREATE INDEX IF NOT EXISTS idx_relationships_type ON relationships(rel_type);

        CREATE TABLE IF NOT EXISTS db_tables (
            component_id INTEGER PRIMARY KEY,
            table_name TEXT NOT NULL,
            FOREIGN KEY(component_id) REFERENCES components(component_id)
        );

        CREATE INDEX IF NOT EXISTS idx_db_tables_name ON db_tables(table_name);

        CREATE TABLE IF NOT EXISTS db_columns (
            column_id INTEGER PRIMARY KEY,
            table_id INTEGER NOT NULL,
            column_name TEXT NOT NULL,
            UNIQUE(table_id, column_name),
            FOREIGN KEY(table_id) REFERENCES db_tables(component_id)
        );

        CREATE TABLE IF NOT EXISTS sql_contents (
            content_id INTEGER PRIMARY KEY,
            component_id INTEGER NOT NULL,
            file_id INTEGER NOT NULL,
            query_type TEXT NOT NULL,
            sql_text BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(component_id, file_id),
            FOREIGN KEY(component_id) REFERENCES components(component_id),
            FOREIGN KEY(file_id) REFERENCES files(file_id)
        );

        CREATE TABLE IF NOT EXISTS pending_refs (
            pending_id INTEGER PRIMARY KEY,
            src_id INTEGER NOT NULL,
            rel_type TEXT NOT NULL,
            target_kind TEXT NOT NULL,
            target_name TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(src_id, rel_type, target_kind, target_name),
            FOREIGN KEY(src_id) REFERENCES components(component_id)
        );

        CREATE INDEX IF NOT EXISTS idx_pending_refs_target
            ON pending_refs(target_kind, target_name);
        COMMIT;
        ",
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                row.get::<_, String>(0)
                    .map(|v| v.parse::<i64>().unwrap_or(0))
            },
        )
        .optional()?;

    let existing = existing.unwrap_or(0);

    if existing > 0 && existing < 2 {
        if !has_column(conn, "files", "content_hash")? {
            conn.execute(
                "ALTER TABLE files ADD COLUMN content_hash TEXT NOT NULL DEFAULT ''",
                [],
            )?;
        }
    }

    if existing > 0 && existing < 3 {
        // Earlier stores accumulated duplicate same-name components and
        // self-loop edges; collapse duplicates onto the lowest id before the
        // unique index can apply.
        conn.execute(
            "DELETE FROM relationships WHERE src_id = dst_id",
            [],
        )?;
        conn.execute(
            "DELETE FROM components
             WHERE component_id NOT IN (
                SELECT MIN(component_id) FROM components
                GROUP BY file_id, component_type, component_name, IFNULL(parent_id, 0)
             )",
            [],
        )?;
    }

    // The natural-key constraint only goes in once legacy duplicates are gone.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_components_natural_key
         ON components(file_id, component_type, component_name, IFNULL(parent_id, 0))",
        [],
    )?;

    if existing < SCHEMA_VERSION {
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('schema_version', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [SCHEMA_VERSION.to_string()],
        )?;
    }

    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for row in rows {
        if row? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
