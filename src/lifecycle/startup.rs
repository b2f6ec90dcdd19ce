//! Startup orchestration.
//!
//! Any error here is fatal: the process exits before binding a listener.

use std::path::Path;
use std::sync::Arc;

use crate::config::SharedConfig;
use crate::error::CrmResult;
use crate::services::Crm;
use crate::store::Store;

/// Open the store from its snapshot, or empty when none is configured.
pub fn open_store(snapshot_path: Option<&str>) -> CrmResult<Arc<Store>> {
    let store = match snapshot_path {
        Some(path) => Store::load_snapshot(Path::new(path))?,
        None => {
            tracing::warn!("No snapshot path configured, data is kept in memory only");
            Store::new()
        }
    };
    Ok(Arc::new(store))
}

/// Open the store, wire every service and seed the operator account.
pub fn build_crm(config: SharedConfig) -> CrmResult<Crm> {
    let (snapshot_path, bootstrap) = {
        let cfg = config.load();
        (cfg.storage.snapshot_path.clone(), cfg.auth.bootstrap.clone())
    };

    let store = open_store(snapshot_path.as_deref())?;
    let crm = Crm::new(store, config);

    if let Some(bootstrap) = bootstrap {
        if crm.tenants.ensure_platform(&bootstrap)?.is_none() {
            tracing::debug!("Platform operator already present");
        }
    }

    let stats = crm.store.stats();
    tracing::info!(
        tenants = stats.tenants,
        users = stats.users,
        leads = stats.leads,
        "Store ready"
    );
    Ok(crm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{shared, BootstrapConfig, CrmConfig};

    #[test]
    fn test_bootstrap_seeds_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CrmConfig::default();
        config.storage.snapshot_path = Some(dir.path().join("crm.json").display().to_string());
        config.auth.bootstrap = Some(BootstrapConfig {
            email: "ops@example.com".into(),
            password: "operator-password".into(),
            name: "Ops".into(),
        });
        let config = shared(config);

        let crm = build_crm(config.clone()).unwrap();
        assert_eq!(crm.store.stats().users, 1);
        assert!(crm.store.tenant_by_slug("platform").is_some());

        let path = config.load().storage.snapshot_path.clone().unwrap();
        crm.store.save_snapshot(Path::new(&path)).unwrap();

        let again = build_crm(config).unwrap();
        assert_eq!(again.store.stats().users, 1);
    }
}
