//! Lead attachments on local disk.
//!
//! # Layout
//! ```text
//! <attachments_dir>/<tenant id>/<attachment id>
//! ```
//! Metadata lives in the store; file names on disk never come from user
//! input.

use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use super::activity_service::ActivityService;
use super::emit;
use crate::auth::{AuthContext, Permission};
use crate::config::SharedConfig;
use crate::error::{CrmError, CrmResult};
use crate::model::{now_millis, ActivityKind, Attachment, AttachmentId, Lead, LeadId, TenantId};
use crate::realtime::{CrmEvent, EventType, Hub};
use crate::store::Store;
use crate::validation::sanitize_filename;

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Media type without parameters, lowercased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

#[derive(Clone)]
pub struct StorageService {
    store: Arc<Store>,
    config: SharedConfig,
    hub: Hub,
    activities: ActivityService,
    root: PathBuf,
}

impl StorageService {
    pub fn new(store: Arc<Store>, config: SharedConfig, hub: Hub, activities: ActivityService) -> Self {
        let root = PathBuf::from(&config.load().storage.attachments_dir);
        Self {
            store,
            config,
            hub,
            activities,
            root,
        }
    }

    fn path_for(&self, tenant: TenantId, id: AttachmentId) -> PathBuf {
        self.root.join(tenant.to_string()).join(id.to_string())
    }

    pub async fn upload(&self, ctx: &AuthContext, lead_id: LeadId, upload: Upload) -> CrmResult<Attachment> {
        ctx.require(Permission::FileWrite)?;
        let lead = self.writable_lead(ctx, lead_id)?;

        let (limit, allowed) = {
            let cfg = self.config.load();
            (
                cfg.storage.max_attachment_bytes,
                cfg.storage.allowed_content_types.clone(),
            )
        };
        let size = upload.bytes.len();
        if size > limit {
            return Err(CrmError::PayloadTooLarge { size, limit });
        }
        if size == 0 {
            return Err(CrmError::invalid("file", "is empty"));
        }
        let content_type = essence(&upload.content_type);
        if !allowed.iter().any(|t| essence(t) == content_type) {
            return Err(CrmError::UnsupportedMediaType(content_type));
        }

        let attachment = Attachment {
            id: AttachmentId::new(),
            tenant_id: ctx.tenant_id,
            lead_id: lead.id,
            filename: sanitize_filename(&upload.filename),
            content_type,
            size: size as u64,
            sha256: format!("{:x}", Sha256::digest(&upload.bytes)),
            uploaded_by: Some(ctx.user_id),
            created_at: now_millis(),
        };

        let path = self.path_for(ctx.tenant_id, attachment.id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let partial = path.with_extension("part");
        tokio::fs::write(&partial, &upload.bytes).await?;
        tokio::fs::rename(&partial, &path).await?;

        self.store.attachments.insert(attachment.id, attachment.clone());
        self.store.touch();

        self.activities.record(
            ctx.tenant_id,
            Some(lead.id),
            Some(ctx.user_id),
            ActivityKind::AttachmentAdded {
                attachment_id: attachment.id,
                filename: attachment.filename.clone(),
            },
        );
        emit(
            &self.hub,
            CrmEvent::new(EventType::AttachmentAdded, ctx.tenant_id, Some(lead.id), &attachment),
        );
        tracing::info!(
            lead = %lead.id,
            attachment = %attachment.id,
            size,
            content_type = %attachment.content_type,
            "Attachment stored"
        );
        Ok(attachment)
    }

    /// Attachments of a lead, newest first.
    pub fn list(&self, ctx: &AuthContext, lead_id: LeadId) -> CrmResult<Vec<Attachment>> {
        ctx.require(Permission::FileRead)?;
        self.store.leads.get(ctx.tenant_id, lead_id)?;
        let mut items = self
            .store
            .attachments
            .list_where(ctx.tenant_id, |a| a.lead_id == lead_id);
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    pub fn get(&self, ctx: &AuthContext, id: AttachmentId) -> CrmResult<Attachment> {
        ctx.require(Permission::FileRead)?;
        self.store.attachments.get(ctx.tenant_id, id)
    }

    pub async fn download(&self, ctx: &AuthContext, id: AttachmentId) -> CrmResult<(Attachment, Vec<u8>)> {
        let attachment = self.get(ctx, id)?;
        let bytes = tokio::fs::read(self.path_for(ctx.tenant_id, id)).await?;
        Ok((attachment, bytes))
    }

    pub async fn delete(&self, ctx: &AuthContext, id: AttachmentId) -> CrmResult<Attachment> {
        ctx.require(Permission::FileWrite)?;
        let attachment = self.store.attachments.get(ctx.tenant_id, id)?;
        let lead = self.store.leads.get(ctx.tenant_id, attachment.lead_id)?;
        ctx.require_lead_write(&lead)?;

        let removed = self.store.attachments.remove(ctx.tenant_id, id)?;
        self.store.touch();
        match tokio::fs::remove_file(self.path_for(ctx.tenant_id, id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(attachment = %id, "Attachment file already missing");
            }
            Err(e) => return Err(e.into()),
        }

        self.activities.record(
            ctx.tenant_id,
            Some(lead.id),
            Some(ctx.user_id),
            ActivityKind::AttachmentRemoved {
                attachment_id: removed.id,
                filename: removed.filename.clone(),
            },
        );
        emit(
            &self.hub,
            CrmEvent::new(EventType::AttachmentRemoved, ctx.tenant_id, Some(lead.id), &removed),
        );
        Ok(removed)
    }

    fn writable_lead(&self, ctx: &AuthContext, lead_id: LeadId) -> CrmResult<Lead> {
        let lead = self.store.leads.get(ctx.tenant_id, lead_id)?;
        if lead.is_archived() {
            return Err(CrmError::Conflict("lead is archived".to_string()));
        }
        ctx.require_lead_write(&lead)?;
        Ok(lead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::services::testing::{config, Fixture};
    use crate::services::NewLead;

    fn fixture(dir: &tempfile::TempDir) -> Fixture {
        let mut cfg = config();
        cfg.storage.attachments_dir = dir.path().display().to_string();
        cfg.storage.max_attachment_bytes = 64;
        Fixture::with_config(cfg)
    }

    fn pdf(name: &str, bytes: &[u8]) -> Upload {
        Upload {
            filename: name.to_string(),
            content_type: "application/pdf".to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_upload_download_delete() {
        let dir = tempfile::tempdir().unwrap();
        let fx = fixture(&dir);
        let lead = fx.crm.leads.create_lead(&fx.admin, NewLead::named("Ada")).unwrap();

        let stored = fx
            .crm
            .storage
            .upload(&fx.admin, lead.id, pdf("../../proposal.pdf", b"%PDF-1.4"))
            .await
            .unwrap();
        assert_eq!(stored.filename, "proposal.pdf");
        assert_eq!(stored.size, 8);
        assert_eq!(stored.sha256.len(), 64);

        let (meta, bytes) = fx.crm.storage.download(&fx.admin, stored.id).await.unwrap();
        assert_eq!(meta.id, stored.id);
        assert_eq!(bytes, b"%PDF-1.4");
        assert_eq!(fx.crm.storage.list(&fx.admin, lead.id).unwrap().len(), 1);

        fx.crm.storage.delete(&fx.admin, stored.id).await.unwrap();
        assert!(fx.crm.storage.list(&fx.admin, lead.id).unwrap().is_empty());
        let path = dir.path().join(fx.tenant.to_string()).join(stored.id.to_string());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_limits_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let fx = fixture(&dir);
        let lead = fx.crm.leads.create_lead(&fx.admin, NewLead::named("Ada")).unwrap();

        let err = fx
            .crm
            .storage
            .upload(&fx.admin, lead.id, pdf("big.pdf", &[0u8; 65]))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::PayloadTooLarge { size: 65, limit: 64 }));

        let exe = Upload {
            filename: "run.exe".into(),
            content_type: "application/x-msdownload".into(),
            bytes: vec![1, 2, 3],
        };
        let err = fx.crm.storage.upload(&fx.admin, lead.id, exe).await.unwrap_err();
        assert!(matches!(err, CrmError::UnsupportedMediaType(_)));

        let text = Upload {
            filename: "notes.txt".into(),
            content_type: "text/plain; charset=utf-8".into(),
            bytes: b"hello".to_vec(),
        };
        let stored = fx.crm.storage.upload(&fx.admin, lead.id, text).await.unwrap();
        assert_eq!(stored.content_type, "text/plain");
    }

    #[tokio::test]
    async fn test_agents_upload_to_own_leads_only() {
        let dir = tempfile::tempdir().unwrap();
        let fx = fixture(&dir);
        let agent = fx.user("agent@acme.test", Role::Agent);
        let lead = fx.crm.leads.create_lead(&fx.admin, NewLead::named("Ada")).unwrap();

        let err = fx
            .crm
            .storage
            .upload(&agent, lead.id, pdf("a.pdf", b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Forbidden(_)));
    }
}
