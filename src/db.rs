use std::path::Path;

use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transform::ApodFields;

// The date column is `data`, kept as-is so existing apod_data tables stay compatible.
// CHECKs stand in for the length and DATE typing SQLite would otherwise ignore.
const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS apod_data (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        title       VARCHAR(255) CHECK (length(title) <= 255),
        explanation TEXT,
        url         TEXT,
        data        DATE CHECK (data IS date(data)),
        media_type  VARCHAR(50) CHECK (length(media_type) <= 50)
    )";

const INSERT_SQL: &str = "INSERT INTO apod_data (title, explanation, url, data, media_type)
     VALUES (?1, ?2, ?3, ?4, ?5)";

pub fn connect(path: &Path) -> Result<Connection> {
    if path.as_os_str().is_empty() {
        return Err(Error::Configuration("database.path is empty".into()));
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::Configuration(format!("cannot create {}: {}", dir.display(), e))
        })?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    debug!("Opened database {}", path.display());
    Ok(conn)
}

/// Create `apod_data` unless it already exists. Safe to call on every run.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute(SCHEMA_SQL, [])?;
    Ok(())
}

/// Insert one row and return its generated id.
pub fn insert_record(conn: &Connection, fields: &ApodFields) -> Result<i64> {
    conn.execute(
        INSERT_SQL,
        params![
            fields.title,
            fields.explanation,
            fields.url,
            fields.date,
            fields.media_type,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

// ── Read-back ──

#[derive(Debug)]
pub struct ApodRow {
    pub id: i64,
    pub fields: ApodFields,
}

/// Most recent rows first.
pub fn fetch_recent(conn: &Connection, limit: usize) -> Result<Vec<ApodRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, COALESCE(title,''), COALESCE(explanation,''), COALESCE(url,''),
                COALESCE(data,''), COALESCE(media_type,'')
         FROM apod_data
         ORDER BY id DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok(ApodRow {
                id: row.get(0)?,
                fields: ApodFields {
                    title: row.get(1)?,
                    explanation: row.get(2)?,
                    url: row.get(3)?,
                    date: row.get(4)?,
                    media_type: row.get(5)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub distinct_dates: usize,
    /// Dates stored more than once, e.g. from overlapping runs.
    pub duplicate_dates: usize,
    pub latest_date: Option<String>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM apod_data", [], |r| r.get(0))?;
    let distinct_dates: usize =
        conn.query_row("SELECT COUNT(DISTINCT data) FROM apod_data", [], |r| r.get(0))?;
    let duplicate_dates: usize = conn.query_row(
        "SELECT COUNT(*) FROM (SELECT data FROM apod_data GROUP BY data HAVING COUNT(*) > 1)",
        [],
        |r| r.get(0),
    )?;
    let latest_date: Option<String> =
        conn.query_row("SELECT MAX(data) FROM apod_data", [], |r| r.get(0))?;
    Ok(Stats {
        total,
        distinct_dates,
        duplicate_dates,
        latest_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn
    }

    fn fields(date: &str) -> ApodFields {
        ApodFields {
            title: "Pillars of Creation".into(),
            explanation: "Columns of gas and dust.".into(),
            url: "https://apod.nasa.gov/apod/image/pillars.jpg".into(),
            date: date.into(),
            media_type: "image".into(),
        }
    }

    fn table_count(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'apod_data'",
            [],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn ensure_schema_twice() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        assert_eq!(table_count(&conn), 1);
    }

    #[test]
    fn ensure_schema_keeps_rows() {
        let conn = memory();
        insert_record(&conn, &fields("2024-01-01")).unwrap();
        ensure_schema(&conn).unwrap();
        assert_eq!(get_stats(&conn).unwrap().total, 1);
    }

    #[test]
    fn insert_into_data_column() {
        let conn = memory();
        let id = insert_record(&conn, &fields("2024-01-01")).unwrap();
        let (title, data): (String, String) = conn
            .query_row(
                "SELECT title, data FROM apod_data WHERE id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(title, "Pillars of Creation");
        assert_eq!(data, "2024-01-01");
    }

    #[test]
    fn ids_are_generated() {
        let conn = memory();
        let a = insert_record(&conn, &fields("2024-01-01")).unwrap();
        let b = insert_record(&conn, &fields("2024-01-02")).unwrap();
        assert!(b > a);
    }

    #[test]
    fn rejects_unparseable_date() {
        let conn = memory();
        for bad in ["", "yesterday", "2024-13-01", "2024-02-30", "01/02/2024"] {
            let err = insert_record(&conn, &fields(bad)).unwrap_err();
            assert!(matches!(err, Error::Persistence(_)), "{:?} accepted", bad);
        }
        assert_eq!(get_stats(&conn).unwrap().total, 0);
    }

    #[test]
    fn only_canonical_dates_accepted() {
        let conn = memory();
        // Postgres would take these; the CHECK keeps the column to YYYY-MM-DD.
        for loose in ["2024-1-1", "20240101", "2024-01-01T00:00:00", "2024-01-01 00:00:00"] {
            let err = insert_record(&conn, &fields(loose)).unwrap_err();
            assert!(matches!(err, Error::Persistence(_)), "{:?} accepted", loose);
        }
        assert_eq!(get_stats(&conn).unwrap().total, 0);
        insert_record(&conn, &fields("2024-02-29")).unwrap();
    }

    #[test]
    fn rejects_long_media_type() {
        let conn = memory();
        let mut f = fields("2024-01-01");
        f.media_type = "x".repeat(51);
        assert!(matches!(insert_record(&conn, &f), Err(Error::Persistence(_))));
        f.media_type = "x".repeat(50);
        assert!(insert_record(&conn, &f).is_ok());
    }

    #[test]
    fn rejects_long_title() {
        let conn = memory();
        let mut f = fields("2024-01-01");
        f.title = "t".repeat(256);
        assert!(matches!(insert_record(&conn, &f), Err(Error::Persistence(_))));
    }

    #[test]
    fn injection_is_inert() {
        let conn = memory();
        let mut f = fields("2024-01-01");
        f.title = "x'); DROP TABLE apod_data; --".into();
        insert_record(&conn, &f).unwrap();
        assert_eq!(table_count(&conn), 1);
        assert_eq!(fetch_recent(&conn, 1).unwrap()[0].fields.title, f.title);
    }

    #[test]
    fn insert_without_schema_fails() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            insert_record(&conn, &fields("2024-01-01")),
            Err(Error::Persistence(_))
        ));
    }

    #[test]
    fn recent_newest_first() {
        let conn = memory();
        for d in ["2024-01-01", "2024-01-02", "2024-01-03"] {
            insert_record(&conn, &fields(d)).unwrap();
        }
        let rows = fetch_recent(&conn, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields.date, "2024-01-03");
        assert_eq!(rows[1].fields.date, "2024-01-02");
    }

    #[test]
    fn stats_counts_duplicates() {
        let conn = memory();
        for d in ["2024-01-01", "2024-01-01", "2024-01-02"] {
            insert_record(&conn, &fields(d)).unwrap();
        }
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.total, 3);
        assert_eq!(s.distinct_dates, 2);
        assert_eq!(s.duplicate_dates, 1);
        assert_eq!(s.latest_date.as_deref(), Some("2024-01-02"));
    }

    #[test]
    fn stats_empty() {
        let s = get_stats(&memory()).unwrap();
        assert_eq!(s.total, 0);
        assert!(s.latest_date.is_none());
    }

    #[test]
    fn connect_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/apod.sqlite");
        let conn = connect(&path).unwrap();
        ensure_schema(&conn).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn connect_empty_path() {
        assert!(matches!(connect(Path::new("")), Err(Error::Configuration(_))));
    }
}
