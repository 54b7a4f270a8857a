use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "profiler.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            iq INTEGER,
            basic_recommendation TEXT,
            average_grade REAL,
            competency_count INTEGER,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    // Workspaces created before cluster write-back lack the label columns.
    ensure_students_cluster_columns(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS competency_templates(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_competency_templates_course ON competency_templates(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_competency_grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            competency_id TEXT NOT NULL,
            grade TEXT NOT NULL CHECK(grade IN ('A', 'B', 'C', 'D')),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(competency_id) REFERENCES competency_templates(id),
            UNIQUE(student_id, competency_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON student_competency_grades(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_competency ON student_competency_grades(competency_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS intelligence_scores(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            intelligence_type TEXT NOT NULL,
            score REAL NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_intelligence_student ON intelligence_scores(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_runs(
            id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            source_name TEXT NOT NULL,
            source_sha256 TEXT NOT NULL,
            update_existing INTEGER NOT NULL,
            summary_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_students_cluster_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "students", "cluster_kmeans")? {
        conn.execute("ALTER TABLE students ADD COLUMN cluster_kmeans INTEGER", [])?;
    }
    if !table_has_column(conn, "students", "cluster_dbscan")? {
        conn.execute("ALTER TABLE students ADD COLUMN cluster_dbscan INTEGER", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, &text),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent_and_adds_cluster_columns() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        assert!(table_has_column(&conn, "students", "cluster_kmeans").expect("pragma"));
        assert!(table_has_column(&conn, "students", "cluster_dbscan").expect("pragma"));
    }

    #[test]
    fn legacy_students_table_is_migrated() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE students(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                iq INTEGER,
                basic_recommendation TEXT,
                average_grade REAL,
                competency_count INTEGER,
                created_at TEXT,
                updated_at TEXT
            )",
            [],
        )
        .expect("legacy table");
        init_schema(&conn).expect("init");
        assert!(table_has_column(&conn, "students", "cluster_dbscan").expect("pragma"));
    }

    #[test]
    fn settings_roundtrip_overwrites() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("init");
        assert!(settings_get_json(&conn, "setup.ingest").expect("get").is_none());
        settings_set_json(&conn, "setup.ingest", &serde_json::json!({ "gradesSheet": "a" }))
            .expect("set");
        settings_set_json(&conn, "setup.ingest", &serde_json::json!({ "gradesSheet": "b" }))
            .expect("set again");
        let v = settings_get_json(&conn, "setup.ingest").expect("get").expect("some");
        assert_eq!(v["gradesSheet"], "b");
    }
}
