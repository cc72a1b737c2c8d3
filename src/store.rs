//! Incident storage shared by the camera daemon and the monitor.
//!
//! Three records: the latest live frame, the current fall event, and the
//! fall history. The SQLite store runs in WAL mode so a monitor process can
//! read while the daemon writes.

use anyhow::{anyhow, Result};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Latest low-quality snapshot from the camera.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveFrame {
    pub jpeg: Vec<u8>,
    /// Wall-clock milliseconds of the upload. The monitor's offline check
    /// reads this.
    pub last_active_ms: u64,
    pub fps: u32,
}

/// Current fall status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FallEvent {
    pub detected: bool,
    pub evidence: Option<Vec<u8>>,
    pub timestamp_ms: Option<u64>,
}

impl FallEvent {
    pub fn raised(evidence: Option<Vec<u8>>, timestamp_ms: u64) -> Self {
        Self {
            detected: true,
            evidence,
            timestamp_ms: Some(timestamp_ms),
        }
    }

    /// State after a caregiver resolves the incident.
    pub fn cleared() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryItem {
    pub id: String,
    pub evidence: Option<Vec<u8>>,
    pub timestamp_ms: u64,
}

impl HistoryItem {
    pub fn new(evidence: Option<Vec<u8>>, timestamp_ms: u64) -> Self {
        Self {
            id: new_history_id(),
            evidence,
            timestamp_ms,
        }
    }
}

pub trait IncidentStore {
    fn put_live_frame(&mut self, frame: &LiveFrame) -> Result<()>;

    fn live_frame(&self) -> Result<Option<LiveFrame>>;

    fn put_fall_event(&mut self, event: &FallEvent) -> Result<()>;

    fn fall_event(&self) -> Result<Option<FallEvent>>;

    fn append_history(&mut self, item: &HistoryItem) -> Result<()>;

    /// Newest first, at most `limit` entries.
    fn recent_history(&self, limit: usize) -> Result<Vec<HistoryItem>>;

    /// Returns false when no entry had that id.
    fn delete_history(&mut self, id: &str) -> Result<bool>;

    /// Mark the current incident handled: `detected=false`, evidence and
    /// timestamp cleared. History is kept.
    fn resolve(&mut self) -> Result<()> {
        self.put_fall_event(&FallEvent::cleared())
    }
}

pub struct SqliteIncidentStore {
    conn: Connection,
}

impl SqliteIncidentStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS live_stream (
              id INTEGER PRIMARY KEY CHECK (id = 1),
              jpeg BLOB NOT NULL,
              last_active INTEGER NOT NULL,
              fps INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fall_event (
              id INTEGER PRIMARY KEY CHECK (id = 1),
              detected INTEGER NOT NULL,
              evidence BLOB,
              timestamp INTEGER
            );

            CREATE TABLE IF NOT EXISTS fall_history (
              seq INTEGER PRIMARY KEY AUTOINCREMENT,
              id TEXT NOT NULL UNIQUE,
              evidence BLOB,
              timestamp INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl IncidentStore for SqliteIncidentStore {
    fn put_live_frame(&mut self, frame: &LiveFrame) -> Result<()> {
        self.conn.execute(
            "INSERT INTO live_stream (id, jpeg, last_active, fps) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
               jpeg = excluded.jpeg,
               last_active = excluded.last_active,
               fps = excluded.fps",
            params![
                frame.jpeg,
                i64::try_from(frame.last_active_ms)?,
                i64::from(frame.fps)
            ],
        )?;
        Ok(())
    }

    fn live_frame(&self) -> Result<Option<LiveFrame>> {
        let row = self
            .conn
            .query_row(
                "SELECT jpeg, last_active, fps FROM live_stream WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((jpeg, last_active, fps)) => Ok(Some(LiveFrame {
                jpeg,
                last_active_ms: u64::try_from(last_active)
                    .map_err(|_| anyhow!("corrupt live_stream: negative last_active"))?,
                fps: u32::try_from(fps).map_err(|_| anyhow!("corrupt live_stream: fps"))?,
            })),
            None => Ok(None),
        }
    }

    fn put_fall_event(&mut self, event: &FallEvent) -> Result<()> {
        let timestamp = event.timestamp_ms.map(i64::try_from).transpose()?;
        self.conn.execute(
            "INSERT INTO fall_event (id, detected, evidence, timestamp) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
               detected = excluded.detected,
               evidence = excluded.evidence,
               timestamp = excluded.timestamp",
            params![event.detected, event.evidence, timestamp],
        )?;
        Ok(())
    }

    fn fall_event(&self) -> Result<Option<FallEvent>> {
        let row = self
            .conn
            .query_row(
                "SELECT detected, evidence, timestamp FROM fall_event WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, bool>(0)?,
                        row.get::<_, Option<Vec<u8>>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((detected, evidence, timestamp)) => Ok(Some(FallEvent {
                detected,
                evidence,
                timestamp_ms: timestamp
                    .map(u64::try_from)
                    .transpose()
                    .map_err(|_| anyhow!("corrupt fall_event: negative timestamp"))?,
            })),
            None => Ok(None),
        }
    }

    fn append_history(&mut self, item: &HistoryItem) -> Result<()> {
        self.conn.execute(
            "INSERT INTO fall_history (id, evidence, timestamp) VALUES (?1, ?2, ?3)",
            params![item.id, item.evidence, i64::try_from(item.timestamp_ms)?],
        )?;
        Ok(())
    }

    fn recent_history(&self, limit: usize) -> Result<Vec<HistoryItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, evidence, timestamp FROM fall_history ORDER BY seq DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![i64::try_from(limit)?], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<Vec<u8>>>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let mut items = Vec::new();
        for row in rows {
            let (id, evidence, timestamp) = row?;
            items.push(HistoryItem {
                id,
                evidence,
                timestamp_ms: u64::try_from(timestamp)
                    .map_err(|_| anyhow!("corrupt fall_history: negative timestamp"))?,
            });
        }
        Ok(items)
    }

    fn delete_history(&mut self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM fall_history WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}

/// Store for tests and single-process demos.
#[derive(Debug, Default)]
pub struct InMemoryIncidentStore {
    live: Option<LiveFrame>,
    fall: Option<FallEvent>,
    history: Vec<HistoryItem>,
}

impl InMemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IncidentStore for InMemoryIncidentStore {
    fn put_live_frame(&mut self, frame: &LiveFrame) -> Result<()> {
        self.live = Some(frame.clone());
        Ok(())
    }

    fn live_frame(&self) -> Result<Option<LiveFrame>> {
        Ok(self.live.clone())
    }

    fn put_fall_event(&mut self, event: &FallEvent) -> Result<()> {
        self.fall = Some(event.clone());
        Ok(())
    }

    fn fall_event(&self) -> Result<Option<FallEvent>> {
        Ok(self.fall.clone())
    }

    fn append_history(&mut self, item: &HistoryItem) -> Result<()> {
        if self.history.iter().any(|existing| existing.id == item.id) {
            return Err(anyhow!("duplicate history id {}", item.id));
        }
        self.history.push(item.clone());
        Ok(())
    }

    fn recent_history(&self, limit: usize) -> Result<Vec<HistoryItem>> {
        Ok(self.history.iter().rev().take(limit).cloned().collect())
    }

    fn delete_history(&mut self, id: &str) -> Result<bool> {
        let before = self.history.len();
        self.history.retain(|item| item.id != id);
        Ok(self.history.len() != before)
    }
}

/// Random 96-bit hex id for history entries.
pub fn new_history_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &mut dyn IncidentStore) -> Result<()> {
        assert!(store.fall_event()?.is_none());
        assert!(store.live_frame()?.is_none());

        store.put_live_frame(&LiveFrame {
            jpeg: vec![0xff, 0xd8],
            last_active_ms: 1_000,
            fps: 12,
        })?;
        store.put_live_frame(&LiveFrame {
            jpeg: vec![0xff, 0xd9],
            last_active_ms: 2_000,
            fps: 14,
        })?;
        let live = store.live_frame()?.unwrap();
        assert_eq!(live.last_active_ms, 2_000);
        assert_eq!(live.fps, 14);

        store.put_fall_event(&FallEvent::raised(Some(vec![1, 2, 3]), 5_000))?;
        assert!(store.fall_event()?.unwrap().detected);
        store.resolve()?;
        assert_eq!(store.fall_event()?.unwrap(), FallEvent::cleared());

        let mut ids = Vec::new();
        for ts in 0..25u64 {
            let item = HistoryItem::new(None, ts);
            ids.push(item.id.clone());
            store.append_history(&item)?;
        }
        let recent = store.recent_history(20)?;
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].timestamp_ms, 24);
        assert_eq!(recent[19].timestamp_ms, 5);

        assert!(store.delete_history(&ids[24])?);
        assert!(!store.delete_history(&ids[24])?);
        assert_eq!(store.recent_history(1)?[0].timestamp_ms, 23);
        Ok(())
    }

    #[test]
    fn sqlite_store_behaves() -> Result<()> {
        exercise(&mut SqliteIncidentStore::open_in_memory()?)
    }

    #[test]
    fn memory_store_behaves() -> Result<()> {
        exercise(&mut InMemoryIncidentStore::new())
    }

    #[test]
    fn history_ids_are_unique_hex() {
        let a = new_history_id();
        let b = new_history_id();
        assert_eq!(a.len(), 24);
        assert_ne!(a, b);
    }
}
