//! JSON snapshot persistence.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::PoisonError;

use super::Store;
use crate::error::CrmResult;
use crate::model::{Activity, Attachment, Lead, Quote, Tenant, User};

const FORMAT_VERSION: u32 = 1;

/// Serialized image of the whole store.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub format_version: u32,
    pub activity_seq: u64,
    pub tenants: Vec<Tenant>,
    pub users: Vec<User>,
    pub leads: Vec<Lead>,
    pub activities: Vec<Activity>,
    pub quotes: Vec<Quote>,
    pub attachments: Vec<Attachment>,
}

impl Store {
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            format_version: FORMAT_VERSION,
            activity_seq: self.activity_seq.load(Ordering::Acquire),
            tenants: self.tenants.all(),
            users: self.users.all(),
            leads: self.leads.all(),
            activities: self.activities.all(),
            quotes: self.quotes.all(),
            attachments: self.attachments.all(),
        }
    }

    /// Rebuild a store, including its unique indexes.
    pub fn from_snapshot(snapshot: Snapshot) -> CrmResult<Self> {
        let store = Store::new();
        for tenant in snapshot.tenants {
            store.insert_tenant(tenant)?;
        }
        for user in snapshot.users {
            store.insert_user(user)?;
        }
        for lead in snapshot.leads {
            store.leads.insert(lead.id, lead);
        }
        for activity in snapshot.activities {
            store.activities.insert(activity.id, activity);
        }
        for quote in snapshot.quotes {
            store.quotes.insert(quote.id, quote);
        }
        for attachment in snapshot.attachments {
            store.attachments.insert(attachment.id, attachment);
        }
        store
            .activity_seq
            .store(snapshot.activity_seq, Ordering::Release);
        store.mark_persisted(store.generation());
        Ok(store)
    }

    /// Write the snapshot next to `path` and rename it into place.
    ///
    /// Returns the generation that was persisted.
    pub fn save_snapshot(&self, path: &Path) -> CrmResult<u64> {
        let _guard = self
            .snapshot_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let generation = self.generation();
        let snapshot = self.to_snapshot();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension(format!("tmp-{:x}", fastrand::u64(..)));
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &snapshot)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;

        self.mark_persisted(generation);
        tracing::info!(
            path = %path.display(),
            tenants = snapshot.tenants.len(),
            leads = snapshot.leads.len(),
            "Saved store snapshot"
        );
        Ok(generation)
    }

    /// Load a snapshot, or start empty when the file does not exist.
    pub fn load_snapshot(path: &Path) -> CrmResult<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No snapshot found, starting empty");
            return Ok(Store::new());
        }
        let file = File::open(path)?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;
        let store = Store::from_snapshot(snapshot)?;
        tracing::info!(
            path = %path.display(),
            tenants = store.tenants.len(),
            leads = store.leads.len(),
            "Loaded store snapshot"
        );
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{now_millis, Role, UserId};

    #[test]
    fn test_snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("crm.json");

        let store = Store::new();
        let tenant = store.insert_tenant(Tenant::new("Acme", "acme", 0)).unwrap();
        let now = now_millis();
        store
            .insert_user(User {
                id: UserId::new(),
                tenant_id: tenant.id,
                email: "ops@acme.io".into(),
                name: "Ops".into(),
                role: Role::Admin,
                password_hash: "h".into(),
                password_salt: "s".into(),
                active: true,
                created_at: now,
                updated_at: now,
                last_login_at: None,
            })
            .unwrap();
        store.next_activity_seq();
        store.save_snapshot(&path).unwrap();
        assert!(!store.is_dirty());

        let loaded = Store::load_snapshot(&path).unwrap();
        assert_eq!(loaded.tenant_by_slug("acme").unwrap().id, tenant.id);
        let user = loaded.user_by_email(tenant.id, "ops@acme.io").unwrap();
        assert_eq!(user.password_hash, "h");
        assert_eq!(loaded.next_activity_seq(), 2);
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn test_concurrent_saves_leave_latest_image() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crm.json");
        let store = Arc::new(Store::new());
        let done = Arc::new(AtomicBool::new(false));

        let savers: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let done = done.clone();
                let path = path.clone();
                std::thread::spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        store.save_snapshot(&path).unwrap();
                    }
                    store.save_snapshot(&path).unwrap();
                })
            })
            .collect();

        for i in 0..200 {
            let slug = format!("t{i}");
            store.insert_tenant(Tenant::new(&slug, &slug, 0)).unwrap();
        }
        done.store(true, Ordering::Release);
        for saver in savers {
            saver.join().unwrap();
        }

        assert!(!store.is_dirty());
        let loaded = Store::load_snapshot(&path).unwrap();
        assert_eq!(loaded.stats().tenants, 200);
    }

    #[test]
    fn test_missing_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::load_snapshot(&dir.path().join("absent.json")).unwrap();
        assert_eq!(store.stats().tenants, 0);
    }
}
