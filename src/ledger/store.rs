use crate::ledger::entry::LedgerEntry;
use anyhow::{anyhow, Result};
use serenity::all::UserId;
use std::{collections::HashMap, io::ErrorKind, path::PathBuf};

const MEMBER_FILE_REL_HOME: &str = ".config/overseer/members.json";

/// In-memory membership ledger backed by a flat JSON file.
///
/// The file is a JSON array with one record per member, loaded fully at
/// startup and rewritten in full after every mutation. A mutation does not
/// count as durable until [`MemberStore::save`] returns Ok.
pub struct MemberStore {
    path: PathBuf,
    members: HashMap<UserId, LedgerEntry>,
}

impl MemberStore {
    fn member_file_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(MEMBER_FILE_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    pub async fn load() -> Result<Self> {
        Self::load_from(Self::member_file_path()?).await
    }

    /// Load from an explicit path. A missing file is an empty store, not an
    /// error.
    pub async fn load_from(path: PathBuf) -> Result<Self> {
        let entries: Vec<LedgerEntry> = match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| {
                anyhow!(
                    "Could not parse member ledger at `{}`: {}",
                    path.to_string_lossy(),
                    e
                )
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(anyhow!(
                    "Could not read member ledger at `{}`: {}",
                    path.to_string_lossy(),
                    e
                ))
            }
        };

        Ok(Self {
            path,
            members: entries
                .into_iter()
                .map(|entry| (entry.member_id, entry))
                .collect(),
        })
    }

    pub fn get(&self, member_id: UserId) -> Option<&LedgerEntry> {
        self.members.get(&member_id)
    }

    pub fn get_mut(&mut self, member_id: UserId) -> Option<&mut LedgerEntry> {
        self.members.get_mut(&member_id)
    }

    /// Insert or replace the entry for its member id.
    pub fn upsert(&mut self, entry: LedgerEntry) {
        self.members.insert(entry.member_id, entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.members.values()
    }

    /// Member with the highest accumulated time. Order is computed on demand;
    /// the store itself keeps no meaningful ordering.
    pub fn leader(&self) -> Option<&LedgerEntry> {
        self.members.values().max_by(|a, b| {
            a.total_minutes_connected
                .total_cmp(&b.total_minutes_connected)
        })
    }

    /// Rewrite the backing file with the full member list, sorted by member
    /// id for a stable layout. Writes to a temporary file first and renames
    /// it over the target.
    pub async fn save(&self) -> Result<()> {
        let mut entries: Vec<&LedgerEntry> = self.members.values().collect();
        entries.sort_by_key(|entry| entry.member_id);

        let serialized = serde_json::to_string_pretty(&entries)
            .map_err(|e| anyhow!("Could not serialize member ledger: {}", e))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                anyhow!(
                    "Could not create directory `{}`: {}",
                    parent.to_string_lossy(),
                    e
                )
            })?;
        }

        let tmp_path = self.path.with_extension("json.new");

        tokio::fs::write(&tmp_path, serialized).await.map_err(|e| {
            anyhow!(
                "Could not write member ledger to temporary file `{}`: {}",
                tmp_path.to_string_lossy(),
                e
            )
        })?;

        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            anyhow!(
                "Could not rename temporary file `{}` to `{}`: {}",
                tmp_path.to_string_lossy(),
                self.path.to_string_lossy(),
                e
            )
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serenity::all::RoleId;

    fn entry(id: u64, total: f64) -> LedgerEntry {
        let mut e = LedgerEntry::new(
            UserId::new(id),
            format!("member-{}", id),
            RoleId::new(1),
            vec![12000.0, 50000.0],
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        );
        e.total_minutes_connected = total;
        e
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemberStore::load_from(dir.path().join("members.json"))
            .await
            .unwrap();
        assert_eq!(store.iter().count(), 0);
    }

    #[tokio::test]
    async fn save_then_load_round_trips_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("members.json");

        let mut store = MemberStore::load_from(path.clone()).await.unwrap();
        store.upsert(entry(1, 30.0));
        store.upsert(entry(2, 90.0));
        store.save().await.unwrap();

        let reloaded = MemberStore::load_from(path).await.unwrap();
        assert_eq!(reloaded.iter().count(), 2);
        assert_eq!(
            reloaded.get(UserId::new(2)),
            store.get(UserId::new(2)),
        );
    }

    #[tokio::test]
    async fn upsert_replaces_the_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemberStore::load_from(dir.path().join("members.json"))
            .await
            .unwrap();

        store.upsert(entry(1, 30.0));
        store.upsert(entry(1, 45.0));
        assert_eq!(store.iter().count(), 1);
        assert_eq!(
            store.get(UserId::new(1)).unwrap().total_minutes_connected,
            45.0
        );
    }

    #[tokio::test]
    async fn leader_is_max_by_total_minutes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemberStore::load_from(dir.path().join("members.json"))
            .await
            .unwrap();
        assert!(store.leader().is_none());

        store.upsert(entry(1, 30.0));
        store.upsert(entry(2, 90.0));
        store.upsert(entry(3, 60.0));
        assert_eq!(store.leader().unwrap().member_id, UserId::new(2));
    }

    #[tokio::test]
    async fn unknown_member_lookup_does_not_mutate() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemberStore::load_from(dir.path().join("members.json"))
            .await
            .unwrap();
        store.upsert(entry(1, 30.0));

        assert!(store.get(UserId::new(99)).is_none());
        assert_eq!(store.iter().count(), 1);
    }
}
