//! Durable SQLite-backed storage for events, checkpoints and commitments.
//!
//! Grounded in `signals::db_storage::DbSignalStorage`: a single connection
//! opened with `SQLITE_OPEN_NO_MUTEX` (this module does its own locking),
//! the same WAL/synchronous/cache_size/temp_store/mmap_size pragma block,
//! and a post-open `PRAGMA journal_mode` check that only warns rather than
//! failing startup.

use crate::checkpoint::Checkpoint;
use crate::commitments::Commitment;
use crate::decimal::Cents;
use crate::events::{Event, EventPayload, SeqNo};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::sync::Arc;
use tracing::warn;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
PRAGMA temp_store = MEMORY;
PRAGMA mmap_size = 268435456;

CREATE TABLE IF NOT EXISTS events (
    instance_id TEXT NOT NULL,
    seq_no INTEGER NOT NULL,
    prev_hash TEXT NOT NULL,
    event_hash TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    payload_json TEXT NOT NULL,
    PRIMARY KEY (instance_id, seq_no)
);

CREATE TABLE IF NOT EXISTS checkpoints (
    instance_id TEXT NOT NULL,
    seq_no INTEGER NOT NULL,
    balance TEXT NOT NULL,
    equity TEXT NOT NULL,
    high_water_mark TEXT NOT NULL,
    hmac TEXT NOT NULL,
    PRIMARY KEY (instance_id, seq_no)
);

CREATE TABLE IF NOT EXISTS commitments (
    instance_id TEXT NOT NULL,
    seq_no INTEGER NOT NULL,
    commitment_hash TEXT NOT NULL,
    last_event_hash TEXT NOT NULL,
    state_hmac TEXT NOT NULL,
    notarized_at TEXT,
    provider TEXT,
    proof TEXT,
    verify_url TEXT,
    PRIMARY KEY (instance_id, seq_no)
);

CREATE INDEX IF NOT EXISTS idx_events_instance ON events(instance_id, seq_no);
"#;

pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("failed to open database at {db_path}"))?;

        conn.execute_batch(SCHEMA_SQL).context("failed to initialize schema")?;

        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)).unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {journal_mode}");
        }

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Run `f` against a single SQLite transaction. The transaction
    /// commits only if `f` returns `Ok`; any error, including one raised
    /// deliberately by a chain or schema check, drops the transaction
    /// without committing.
    pub fn transact<T>(&self, f: impl FnOnce(&rusqlite::Transaction) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("failed to open transaction")?;
        let result = f(&tx)?;
        tx.commit().context("failed to commit transaction")?;
        Ok(result)
    }

    pub fn last_event(tx: &rusqlite::Transaction, instance_id: &str) -> Result<Option<(SeqNo, String)>> {
        let row = tx
            .query_row(
                "SELECT seq_no, event_hash FROM events WHERE instance_id = ?1 ORDER BY seq_no DESC LIMIT 1",
                params![instance_id],
                |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)),
            )
            .ok();
        Ok(row)
    }

    pub fn find_event(tx: &rusqlite::Transaction, instance_id: &str, seq_no: SeqNo) -> Result<Option<Event>> {
        let row: Option<(String, String, i64, String)> = tx
            .query_row(
                "SELECT prev_hash, event_hash, timestamp, payload_json FROM events \
                 WHERE instance_id = ?1 AND seq_no = ?2",
                params![instance_id, seq_no as i64],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .ok();
        Ok(row.map(|(prev_hash, event_hash, timestamp, payload_json)| {
            let payload: EventPayload =
                serde_json::from_str(&payload_json).expect("stored payload is always valid JSON");
            Event { instance_id: instance_id.to_string(), seq_no, prev_hash, event_hash, timestamp, payload }
        }))
    }

    pub fn insert_event(tx: &rusqlite::Transaction, event: &Event) -> Result<()> {
        let payload_json = serde_json::to_string(&event.payload).expect("EventPayload always serializes");
        tx.execute(
            "INSERT INTO events (instance_id, seq_no, prev_hash, event_hash, timestamp, payload_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.instance_id,
                event.seq_no as i64,
                event.prev_hash,
                event.event_hash,
                event.timestamp,
                payload_json
            ],
        )?;
        Ok(())
    }

    pub fn load_events(&self, instance_id: &str) -> Result<Vec<Event>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT seq_no, prev_hash, event_hash, timestamp, payload_json FROM events \
             WHERE instance_id = ?1 ORDER BY seq_no ASC",
        )?;
        let rows = stmt.query_map(params![instance_id], |row| {
            let seq_no: i64 = row.get(0)?;
            let prev_hash: String = row.get(1)?;
            let event_hash: String = row.get(2)?;
            let timestamp: i64 = row.get(3)?;
            let payload_json: String = row.get(4)?;
            Ok((seq_no as u64, prev_hash, event_hash, timestamp, payload_json))
        })?;
        let mut events = Vec::new();
        for row in rows {
            let (seq_no, prev_hash, event_hash, timestamp, payload_json) = row?;
            let payload: EventPayload =
                serde_json::from_str(&payload_json).expect("stored payload is always valid JSON");
            events.push(Event { instance_id: instance_id.to_string(), seq_no, prev_hash, event_hash, timestamp, payload });
        }
        Ok(events)
    }

    pub fn insert_checkpoint(tx: &rusqlite::Transaction, cp: &Checkpoint) -> Result<()> {
        tx.execute(
            "INSERT INTO checkpoints (instance_id, seq_no, balance, equity, high_water_mark, hmac) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                cp.instance_id,
                cp.seq_no as i64,
                cp.balance.canonical_string(),
                cp.equity.canonical_string(),
                cp.high_water_mark.canonical_string(),
                cp.hmac
            ],
        )?;
        Ok(())
    }

    pub fn load_checkpoints(&self, instance_id: &str) -> Result<Vec<Checkpoint>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT seq_no, balance, equity, high_water_mark, hmac FROM checkpoints \
             WHERE instance_id = ?1 ORDER BY seq_no ASC",
        )?;
        let rows = stmt.query_map(params![instance_id], |row| {
            let seq_no: i64 = row.get(0)?;
            let balance: String = row.get(1)?;
            let equity: String = row.get(2)?;
            let hwm: String = row.get(3)?;
            let hmac: String = row.get(4)?;
            Ok((seq_no as u64, balance, equity, hwm, hmac))
        })?;
        let mut checkpoints = Vec::new();
        for row in rows {
            let (seq_no, balance, equity, hwm, hmac) = row?;
            checkpoints.push(Checkpoint {
                instance_id: instance_id.to_string(),
                seq_no,
                balance: Cents::from_minor_units(
                    crate::decimal::Fixed::<2>::parse_canonical(&balance).expect("stored decimal is canonical").minor_units(),
                ),
                equity: Cents::from_minor_units(
                    crate::decimal::Fixed::<2>::parse_canonical(&equity).expect("stored decimal is canonical").minor_units(),
                ),
                high_water_mark: Cents::from_minor_units(
                    crate::decimal::Fixed::<2>::parse_canonical(&hwm).expect("stored decimal is canonical").minor_units(),
                ),
                hmac,
            });
        }
        Ok(checkpoints)
    }

    pub fn insert_commitment(tx: &rusqlite::Transaction, c: &Commitment) -> Result<()> {
        tx.execute(
            "INSERT INTO commitments \
             (instance_id, seq_no, commitment_hash, last_event_hash, state_hmac, notarized_at, provider, proof, verify_url) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                c.instance_id,
                c.seq_no as i64,
                c.commitment_hash,
                c.last_event_hash,
                c.state_hmac,
                c.notarized_at.map(|t| t.to_rfc3339()),
                c.provider,
                c.proof,
                c.verify_url,
            ],
        )?;
        Ok(())
    }

    pub fn load_commitments(&self, instance_id: &str) -> Result<Vec<Commitment>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT seq_no, commitment_hash, last_event_hash, state_hmac, notarized_at, provider, proof, verify_url \
             FROM commitments WHERE instance_id = ?1 ORDER BY seq_no ASC",
        )?;
        let rows = stmt.query_map(params![instance_id], |row| {
            let seq_no: i64 = row.get(0)?;
            let commitment_hash: String = row.get(1)?;
            let last_event_hash: String = row.get(2)?;
            let state_hmac: String = row.get(3)?;
            let notarized_at: Option<String> = row.get(4)?;
            let provider: Option<String> = row.get(5)?;
            let proof: Option<String> = row.get(6)?;
            let verify_url: Option<String> = row.get(7)?;
            Ok((seq_no as u64, commitment_hash, last_event_hash, state_hmac, notarized_at, provider, proof, verify_url))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (seq_no, commitment_hash, last_event_hash, state_hmac, notarized_at, provider, proof, verify_url) = row?;
            out.push(Commitment {
                instance_id: instance_id.to_string(),
                seq_no,
                commitment_hash,
                last_event_hash,
                state_hmac,
                notarized_at: notarized_at.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|dt| dt.with_timezone(&chrono::Utc)),
                provider,
                proof,
                verify_url,
            });
        }
        Ok(out)
    }

    pub fn list_instance_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT instance_id FROM events ORDER BY instance_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
