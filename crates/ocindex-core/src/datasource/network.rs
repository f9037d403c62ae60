//! Resolution cache on a Redis-compatible key-value server.
//!
//! Key: prefixed identifier. Value: the JSON form of [`ResolutionRecord`],
//! `{"valid": true|false|null, "date": [...], "issn": [...], "orcid": [...]}`.
//! Writes run inside WATCH/MULTI transactions so concurrent writers to the
//! same key still end up with the union of their facts.

use std::sync::Mutex;

use redis::{Commands, Connection, ErrorKind, RedisError, RedisResult};

use super::{CacheError, DataSource};
use crate::record::ResolutionRecord;

pub struct RedisDataSource {
    conn: Mutex<Connection>,
}

impl RedisDataSource {
    /// Connect to `url` (`redis://host:port/db`).
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn decode(raw: Option<String>) -> RedisResult<Option<ResolutionRecord>> {
    raw.map(|json| {
        serde_json::from_str(&json).map_err(|e| {
            RedisError::from((ErrorKind::TypeError, "malformed cached record", e.to_string()))
        })
    })
    .transpose()
}

fn encode(record: &ResolutionRecord) -> RedisResult<String> {
    serde_json::to_string(record).map_err(|e| {
        RedisError::from((ErrorKind::TypeError, "unencodable record", e.to_string()))
    })
}

/// Fold incoming records into the stored ones, keeping order of `ids`.
fn merge_all(
    stored: Vec<Option<String>>,
    incoming: &[(String, ResolutionRecord)],
) -> RedisResult<Vec<(String, String)>> {
    stored
        .into_iter()
        .zip(incoming)
        .map(|(raw, (id, record))| {
            let merged = decode(raw)?.unwrap_or_default().merged(record);
            Ok((id.clone(), encode(&merged)?))
        })
        .collect()
}

impl DataSource for RedisDataSource {
    fn get(&self, id: &str) -> Result<Option<ResolutionRecord>, CacheError> {
        let mut conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let raw: Option<String> = conn.get(id)?;
        Ok(decode(raw)?)
    }

    fn mget(&self, ids: &[String]) -> Result<Vec<Option<ResolutionRecord>>, CacheError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let raw: Vec<Option<String>> = redis::cmd("MGET").arg(ids).query(&mut *conn)?;
        Ok(raw.into_iter().map(decode).collect::<RedisResult<_>>()?)
    }

    fn set(&self, id: &str, record: ResolutionRecord) -> Result<(), CacheError> {
        self.mset(vec![(id.to_string(), record)])
    }

    fn mset(&self, records: Vec<(String, ResolutionRecord)>) -> Result<(), CacheError> {
        if records.is_empty() {
            return Ok(());
        }
        let keys: Vec<&str> = records.iter().map(|(id, _)| id.as_str()).collect();
        let mut conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        redis::transaction(&mut *conn, &keys, |con, pipe| {
            let stored: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query(con)?;
            for (id, json) in merge_all(stored, &records)? {
                pipe.set(id, json).ignore();
            }
            pipe.query::<Option<()>>(con)
        })?;
        Ok(())
    }
}
