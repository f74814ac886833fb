//! Secondary index plan for the room event table.
//!
//! The plan is a fixed table of [`IndexSpec`]s over envelope and payload
//! paths (`cid`, `t`, `d.u._id`, ...). [`IndexPlan::sqlite_ddl`] renders it
//! to `SQLite`:
//!
//! | kind | rendering |
//! |---|---|
//! | `Ascending` | expression index on `json_extract(data, ..)`, partial when sparse |
//! | `Ttl` | index on the denormalized `expire_at` column |
//! | `Text` | FTS5 table kept in sync by triggers |
//! | `Geo2dSphere` | R*Tree over `[lng, lat]` kept in sync by triggers |
//! | `Multikey` | side table with one row per array element |
//!
//! The addressing index `(ct, cid, t, _cid)` is part of the base schema, not
//! the plan.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::Result;

/// Base event table.
pub const ROOM_EVENTS_TABLE: &str = "room_events";
/// FTS5 table over message bodies.
pub const BODY_TEXT_TABLE: &str = "room_events_body_text";
/// R*Tree over message locations.
pub const LOCATION_TABLE: &str = "room_events_location";
/// Side table of mentioned usernames.
pub const MENTIONS_TABLE: &str = "room_events_mentions";

/// How a key is indexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    /// Ordered B-tree key.
    Ascending,
    /// Rows expire once the instant at the path plus the grace period passes.
    Ttl {
        /// Grace period after the stored instant.
        expire_after_secs: u64,
    },
    /// Full-text over a string field.
    Text,
    /// GeoJSON point, `[longitude, latitude]`.
    Geo2dSphere,
    /// Field of each element of an array.
    Multikey {
        /// Path of the array the key's path descends into.
        array: &'static str,
    },
}

/// One key of an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexKey {
    /// Dotted document path.
    pub path: &'static str,
    /// Index kind.
    pub kind: IndexKind,
}

/// One secondary index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexSpec {
    /// Short name, unique within the plan.
    pub name: &'static str,
    /// Ordered keys.
    pub keys: &'static [IndexKey],
    /// Only rows that carry the indexed payload field are indexed.
    pub sparse: bool,
}

impl IndexSpec {
    /// Kind of the leading key.
    pub fn kind(&self) -> IndexKind {
        self.keys.first().map_or(IndexKind::Ascending, |k| k.kind)
    }

    /// Whether the index has more than one key.
    pub fn is_compound(&self) -> bool {
        self.keys.len() > 1
    }

    /// Whether this index serves a feature (expiry, search, geo) rather
    /// than a lookup on an optional field.
    pub fn serves_feature(&self) -> bool {
        matches!(
            self.kind(),
            IndexKind::Ttl { .. } | IndexKind::Text | IndexKind::Geo2dSphere
        )
    }

    fn sql_name(&self) -> String {
        format!("idx_{ROOM_EVENTS_TABLE}_{}", self.name)
    }

    fn side_table(&self) -> String {
        format!("{ROOM_EVENTS_TABLE}_{}", self.name)
    }
}

const fn asc(path: &'static str) -> IndexKey {
    IndexKey {
        path,
        kind: IndexKind::Ascending,
    }
}

const fn sparse(name: &'static str, keys: &'static [IndexKey]) -> IndexSpec {
    IndexSpec {
        name,
        keys,
        sparse: true,
    }
}

const ROOM_EVENT_INDEXES: &[IndexSpec] = &[
    sparse("author", &[asc("d.u._id")]),
    sparse("context_type_author", &[asc("cid"), asc("t"), asc("d.u._id")]),
    IndexSpec {
        name: "expire_at",
        keys: &[IndexKey {
            path: "d.expireAt",
            kind: IndexKind::Ttl {
                expire_after_secs: 0,
            },
        }],
        sparse: false,
    },
    sparse(
        "body_text",
        &[IndexKey {
            path: "d.msg",
            kind: IndexKind::Text,
        }],
    ),
    sparse("file", &[asc("d.file._id")]),
    sparse(
        "mentions",
        &[IndexKey {
            path: "d.mentions.username",
            kind: IndexKind::Multikey {
                array: "d.mentions",
            },
        }],
    ),
    sparse("pinned", &[asc("d.pinned")]),
    sparse("snippeted", &[asc("d.snippeted")]),
    IndexSpec {
        name: "location",
        keys: &[IndexKey {
            path: "d.location",
            kind: IndexKind::Geo2dSphere,
        }],
        sparse: false,
    },
    sparse("unread", &[asc("d.unread")]),
    sparse("slack_bridge", &[asc("d.slackBotId"), asc("d.slackTs")]),
    sparse("discussion", &[asc("d.drid")]),
    sparse("thread", &[asc("d.tmid")]),
    sparse("thread_activity", &[asc("d.tcount"), asc("d.tlm")]),
    sparse("navigation_token", &[asc("d.navigation.token")]),
];

/// The fixed set of secondary indexes for room events.
#[derive(Clone, Copy, Debug)]
pub struct IndexPlan {
    specs: &'static [IndexSpec],
}

impl IndexPlan {
    /// The room event plan.
    pub fn room_events() -> Self {
        Self {
            specs: ROOM_EVENT_INDEXES,
        }
    }

    /// All index specs, in declaration order.
    pub fn specs(&self) -> &'static [IndexSpec] {
        self.specs
    }

    /// Look up a spec by name.
    pub fn get(&self, name: &str) -> Option<&'static IndexSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Grace period of the TTL index in milliseconds, if the plan has one.
    pub fn ttl_grace_ms(&self) -> Option<i64> {
        self.specs.iter().find_map(|s| match s.kind() {
            IndexKind::Ttl { expire_after_secs } => {
                Some(i64::try_from(expire_after_secs.saturating_mul(1000)).unwrap_or(i64::MAX))
            }
            _ => None,
        })
    }

    /// Render the plan as idempotent `SQLite` DDL.
    pub fn sqlite_ddl(&self) -> String {
        self.specs
            .iter()
            .map(render_spec)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Create every index, table and trigger in the plan.
    ///
    /// Side tables created by this call are backfilled from existing rows;
    /// side tables that already existed are left to their triggers.
    pub fn ensure(&self, conn: &Connection) -> Result<()> {
        let mut missing = Vec::new();
        for spec in self.specs.iter().filter(|s| has_side_table(s)) {
            if !table_exists(conn, &spec.side_table())? {
                missing.push(spec);
            }
        }

        conn.execute_batch(&self.sqlite_ddl())?;

        for spec in missing {
            if let Some(sql) = backfill_sql(spec) {
                let rows = conn.execute(&sql, [])?;
                info!(index = spec.name, rows, "backfilled index side table");
            }
        }
        debug!(indexes = self.specs.len(), "index plan ensured");
        Ok(())
    }
}

/// SQL expression reading `path` from a `room_events` row.
fn column_expr(path: &str) -> String {
    match path {
        "_cid" => "client_id".to_string(),
        "v" => "version".to_string(),
        "ts" => "timestamp".to_string(),
        "src" => "source".to_string(),
        "ct" => "context_type".to_string(),
        "cid" => "context_id".to_string(),
        "t" => "event_type".to_string(),
        _ => format!("json_extract(data, '{}')", json_path(path)),
    }
}

/// `d.u._id` → `$.u._id`.
fn json_path(path: &str) -> String {
    let inner = path.strip_prefix("d.").unwrap_or(path);
    format!("$.{inner}")
}

fn is_payload_path(path: &str) -> bool {
    path.starts_with("d.")
}

fn has_side_table(spec: &IndexSpec) -> bool {
    matches!(
        spec.kind(),
        IndexKind::Text | IndexKind::Geo2dSphere | IndexKind::Multikey { .. }
    )
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn render_spec(spec: &IndexSpec) -> String {
    match spec.kind() {
        IndexKind::Ascending => render_ascending(spec),
        IndexKind::Ttl { .. } => format!(
            "CREATE INDEX IF NOT EXISTS {} ON {ROOM_EVENTS_TABLE}(expire_at) WHERE expire_at IS NOT NULL;",
            spec.sql_name()
        ),
        IndexKind::Text => render_text(spec),
        IndexKind::Geo2dSphere => render_geo(spec),
        IndexKind::Multikey { array } => render_multikey(spec, array),
    }
}

fn render_ascending(spec: &IndexSpec) -> String {
    let columns = spec
        .keys
        .iter()
        .map(|k| column_expr(k.path))
        .collect::<Vec<_>>()
        .join(", ");
    let predicate = if spec.sparse {
        let present = spec
            .keys
            .iter()
            .filter(|k| is_payload_path(k.path))
            .map(|k| format!("json_type(data, '{}') IS NOT NULL", json_path(k.path)))
            .collect::<Vec<_>>();
        if present.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", present.join(" OR "))
        }
    } else {
        String::new()
    };
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {ROOM_EVENTS_TABLE}({columns}){predicate};",
        spec.sql_name()
    )
}

/// Sync triggers: insert, delete, and payload update (delete then insert).
fn render_triggers(table: &str, id_column: &str, insert_for_new: &str) -> String {
    format!(
        "CREATE TRIGGER IF NOT EXISTS {table}_insert AFTER INSERT ON {ROOM_EVENTS_TABLE} BEGIN
  {insert_for_new}
END;
CREATE TRIGGER IF NOT EXISTS {table}_delete AFTER DELETE ON {ROOM_EVENTS_TABLE} BEGIN
  DELETE FROM {table} WHERE {id_column} = old.seq;
END;
CREATE TRIGGER IF NOT EXISTS {table}_update AFTER UPDATE OF data ON {ROOM_EVENTS_TABLE} BEGIN
  DELETE FROM {table} WHERE {id_column} = old.seq;
  {insert_for_new}
END;"
    )
}

fn text_insert(spec: &IndexSpec, row: &str, from: &str) -> String {
    let path = json_path(spec.keys[0].path);
    format!(
        "INSERT INTO {table}(rowid, body) SELECT {row}.seq, json_extract({row}.data, '{path}'){from} WHERE json_type({row}.data, '{path}') = 'text';",
        table = spec.side_table()
    )
}

fn render_text(spec: &IndexSpec) -> String {
    let table = spec.side_table();
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING fts5(body, tokenize = 'unicode61');\n{}",
        render_triggers(&table, "rowid", &text_insert(spec, "new", ""))
    )
}

fn geo_insert(spec: &IndexSpec, row: &str, from: &str) -> String {
    let base = json_path(spec.keys[0].path);
    let lng = format!("{base}.coordinates[0]");
    let lat = format!("{base}.coordinates[1]");
    format!(
        "INSERT INTO {table}(id, min_lng, max_lng, min_lat, max_lat) \
         SELECT {row}.seq, json_extract({row}.data, '{lng}'), json_extract({row}.data, '{lng}'), \
         json_extract({row}.data, '{lat}'), json_extract({row}.data, '{lat}'){from} \
         WHERE json_type({row}.data, '{lng}') IN ('integer', 'real') \
         AND json_type({row}.data, '{lat}') IN ('integer', 'real');",
        table = spec.side_table()
    )
}

fn render_geo(spec: &IndexSpec) -> String {
    let table = spec.side_table();
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING rtree(id, min_lng, max_lng, min_lat, max_lat);\n{}",
        render_triggers(&table, "id", &geo_insert(spec, "new", ""))
    )
}

/// Expand each element of the array into a side-table row. `sources` is
/// empty inside a trigger and names the base table for a backfill.
fn multikey_insert(spec: &IndexSpec, array: &str, row: &str, sources: &str) -> String {
    let array_path = json_path(array);
    let field = spec.keys[0]
        .path
        .strip_prefix(array)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or("");
    let element = if field.is_empty() {
        "m.value".to_string()
    } else {
        format!("CASE WHEN m.type = 'object' THEN json_extract(m.value, '$.{field}') END")
    };
    format!(
        "INSERT INTO {table}(event_seq, value) SELECT seq, v FROM (SELECT {row}.seq AS seq, {element} AS v FROM {sources}json_each({row}.data, '{array_path}') AS m) WHERE v IS NOT NULL;",
        table = spec.side_table()
    )
}

fn render_multikey(spec: &IndexSpec, array: &str) -> String {
    let table = spec.side_table();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (event_seq INTEGER NOT NULL, value TEXT NOT NULL);
CREATE INDEX IF NOT EXISTS idx_{table}_value ON {table}(value);
CREATE INDEX IF NOT EXISTS idx_{table}_event ON {table}(event_seq);
{}",
        render_triggers(&table, "event_seq", &multikey_insert(spec, array, "new", ""))
    )
}

fn backfill_sql(spec: &IndexSpec) -> Option<String> {
    let from = format!(" FROM {ROOM_EVENTS_TABLE} AS r");
    match spec.kind() {
        IndexKind::Text => Some(text_insert(spec, "r", &from)),
        IndexKind::Geo2dSphere => Some(geo_insert(spec, "r", &from)),
        IndexKind::Multikey { array } => Some(multikey_insert(
            spec,
            array,
            "r",
            &format!("{ROOM_EVENTS_TABLE} AS r, "),
        )),
        IndexKind::Ascending | IndexKind::Ttl { .. } => None,
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;

    fn migrated() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn names(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1")
            .unwrap()
            .query_map([kind], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    fn insert(conn: &Connection, version: i64, data: &str) {
        conn.execute(
            "INSERT INTO room_events (version, timestamp, source, context_type, context_id, event_type, data)
             VALUES (?1, '2024-01-01T00:00:00.000Z', 'local', 'room', 'r1', 'msg', ?2)",
            rusqlite::params![version, data],
        )
        .unwrap();
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn plan_has_every_access_pattern() {
        let plan = IndexPlan::room_events();
        assert_eq!(plan.specs().len(), 15);
        for name in [
            "author",
            "context_type_author",
            "expire_at",
            "body_text",
            "file",
            "mentions",
            "pinned",
            "snippeted",
            "location",
            "unread",
            "slack_bridge",
            "discussion",
            "thread",
            "thread_activity",
            "navigation_token",
        ] {
            assert!(plan.get(name).is_some(), "missing index {name}");
        }
    }

    #[test]
    fn names_are_unique() {
        let plan = IndexPlan::room_events();
        let mut seen = std::collections::HashSet::new();
        for spec in plan.specs() {
            assert!(seen.insert(spec.name), "duplicate index {}", spec.name);
        }
    }

    #[test]
    fn every_index_is_sparse_or_serves_a_feature() {
        for spec in IndexPlan::room_events().specs() {
            assert!(
                spec.sparse || spec.serves_feature(),
                "{} is neither sparse nor a feature index",
                spec.name
            );
        }
    }

    #[test]
    fn location_is_not_sparse_and_ttl_has_no_grace() {
        let plan = IndexPlan::room_events();
        let location = plan.get("location").unwrap();
        assert!(!location.sparse);
        assert_eq!(location.kind(), IndexKind::Geo2dSphere);
        assert_eq!(plan.ttl_grace_ms(), Some(0));
    }

    #[test]
    fn compound_keys_keep_order() {
        let plan = IndexPlan::room_events();
        let spec = plan.get("context_type_author").unwrap();
        assert!(spec.is_compound());
        let paths: Vec<_> = spec.keys.iter().map(|k| k.path).collect();
        assert_eq!(paths, ["cid", "t", "d.u._id"]);
    }

    #[test]
    fn ddl_renders_partial_expression_indexes() {
        let ddl = IndexPlan::room_events().sqlite_ddl();
        assert!(ddl.contains(
            "ON room_events(context_id, event_type, json_extract(data, '$.u._id')) WHERE json_type(data, '$.u._id') IS NOT NULL;"
        ));
        assert!(ddl.contains(
            "WHERE json_type(data, '$.slackBotId') IS NOT NULL OR json_type(data, '$.slackTs') IS NOT NULL;"
        ));
    }

    #[test]
    fn ensure_creates_side_tables_and_is_idempotent() {
        let conn = migrated();
        let plan = IndexPlan::room_events();
        plan.ensure(&conn).unwrap();
        plan.ensure(&conn).unwrap();

        let tables = names(&conn, "table");
        for table in [BODY_TEXT_TABLE, LOCATION_TABLE, MENTIONS_TABLE] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
        let indexes = names(&conn, "index");
        assert!(indexes.contains(&"idx_room_events_expire_at".to_string()));
        assert!(indexes.contains(&"idx_room_events_thread".to_string()));
    }

    #[test]
    fn triggers_track_inserts_updates_and_deletes() {
        let conn = migrated();
        IndexPlan::room_events().ensure(&conn).unwrap();

        insert(
            &conn,
            1,
            r#"{"msg":"hello world","location":{"type":"Point","coordinates":[13.4,52.5]},"mentions":[{"_id":"u2","username":"bob"},"junk"]}"#,
        );
        insert(&conn, 2, r#"{"t":"uj"}"#);
        assert_eq!(count(&conn, BODY_TEXT_TABLE), 1);
        assert_eq!(count(&conn, LOCATION_TABLE), 1);
        assert_eq!(count(&conn, MENTIONS_TABLE), 1);

        conn.execute("UPDATE room_events SET data = '{\"msg\":\"bye\"}' WHERE version = 1", [])
            .unwrap();
        assert_eq!(count(&conn, BODY_TEXT_TABLE), 1);
        assert_eq!(count(&conn, LOCATION_TABLE), 0);
        assert_eq!(count(&conn, MENTIONS_TABLE), 0);
        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM room_events_body_text WHERE room_events_body_text MATCH 'bye'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);

        conn.execute("DELETE FROM room_events", []).unwrap();
        assert_eq!(count(&conn, BODY_TEXT_TABLE), 0);
    }

    #[test]
    fn ensure_backfills_new_side_tables() {
        let conn = migrated();
        insert(
            &conn,
            1,
            r#"{"msg":"before the plan","mentions":[{"_id":"u1","username":"alice"}]}"#,
        );
        IndexPlan::room_events().ensure(&conn).unwrap();
        assert_eq!(count(&conn, BODY_TEXT_TABLE), 1);
        assert_eq!(count(&conn, MENTIONS_TABLE), 1);
        assert_eq!(count(&conn, LOCATION_TABLE), 0);
    }
}
