//! Row hashing and sync scoring

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use super::{Row, TableSyncResult};

/// Text hashed in place of SQL NULL
pub const NULL_SENTINEL: &str = "NULL";

/// Terminator appended after every column value
pub const FIELD_SEPARATOR: char = '|';

/// Placeholder summary hash for tables that could not be read
pub const ERROR_HASH: &str = "ERROR";

const SUMMARY_HASH_LEN: usize = 16;

/// Primary key text to hex row digest, ordered by key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowHashMap(BTreeMap<String, String>);

impl RowHashMap {
    /// Hash every row, keying it by the column at `key_index`
    pub fn from_rows(rows: &[Row], key_index: usize) -> Self {
        let map = rows
            .iter()
            .map(|row| {
                let key = row
                    .get(key_index)
                    .and_then(|v| v.as_deref())
                    .unwrap_or(NULL_SENTINEL)
                    .to_string();
                (key, hash_row(row))
            })
            .collect();
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, hash: impl Into<String>) {
        self.0.insert(key.into(), hash.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Truncated digest of the whole map; diagnostic only
    pub fn summary_hash(&self) -> String {
        let mut digest = sha256_hex(&self.to_string());
        digest.truncate(SUMMARY_HASH_LEN);
        digest
    }
}

impl std::fmt::Display for RowHashMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (key, hash)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, hash)?;
        }
        write!(f, "}}")
    }
}

/// Digest of one row: every value followed by `|`, NULL as `NULL`
pub fn hash_row(row: &Row) -> String {
    let mut data = String::new();
    for value in row {
        data.push_str(value.as_deref().unwrap_or(NULL_SENTINEL));
        data.push(FIELD_SEPARATOR);
    }
    sha256_hex(&data)
}

pub fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Round half away from zero to 2 decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score one table from both replicas' row hashes
///
/// A key counts as matched only when present on both sides with equal
/// hashes; keys seen on one side only still enlarge the universe.
pub fn score(table_name: &str, active: &RowHashMap, standby: &RowHashMap) -> TableSyncResult {
    let universe: BTreeSet<&String> = active.keys().chain(standby.keys()).collect();
    let matched = universe
        .iter()
        .filter(|key| match (active.get(key), standby.get(key)) {
            (Some(a), Some(s)) => a == s,
            _ => false,
        })
        .count();

    let sync_percent = if universe.is_empty() {
        100.0
    } else {
        round2(matched as f64 * 100.0 / universe.len() as f64)
    };

    TableSyncResult {
        table_name: table_name.to_string(),
        active_summary_hash: active.summary_hash(),
        standby_summary_hash: standby.summary_hash(),
        synced: sync_percent == 100.0,
        active_row_count: active.len() as i64,
        standby_row_count: standby.len() as i64,
        sync_percent,
    }
}
