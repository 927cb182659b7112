//! Task-oriented Drive operations.

use std::sync::Arc;

use tracing::{debug, info, warn};

use gworks_auth::Connection;
use gworks_common::{Error, FileId, Result};

use crate::client::{DriveClient, DriveFile, Grantee, PermissionRole};

/// Sharing applied after a create, copy or export operation.
#[derive(Debug, Clone)]
pub struct ShareRequest {
    /// Anyone-with-the-link when no account is given, else a named user.
    pub grantee: Grantee,
    /// Role granted on the new file.
    pub role: PermissionRole,
}

impl Default for ShareRequest {
    fn default() -> Self {
        Self {
            grantee: Grantee::Anyone,
            role: PermissionRole::Reader,
        }
    }
}

impl ShareRequest {
    /// Build a request from the optional account / role pair the callers use.
    pub fn new(account: Option<String>, role: PermissionRole) -> Self {
        Self {
            grantee: Grantee::from_account(account),
            role,
        }
    }
}

/// What a delete actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The file was moved to the trash (soft delete).
    Trashed,
    /// The file was already trashed and has been permanently deleted.
    Deleted,
}

/// Listing options; folders and shortcuts are filtered out by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub include_folders: bool,
    pub include_shortcuts: bool,
}

/// Google Drive facade.
pub struct Drive {
    client: DriveClient,
}

impl Drive {
    /// Create a facade on a shared connection.
    pub fn new(conn: Arc<Connection>) -> Self {
        Self {
            client: DriveClient::new(conn),
        }
    }

    /// Create a facade over a preconfigured client (tests, staging).
    pub fn with_client(client: DriveClient) -> Self {
        Self { client }
    }

    /// The underlying REST client.
    pub fn client(&self) -> &DriveClient {
        &self.client
    }

    /// Upload content into a folder, grant the requested permission and
    /// return the browser view link.
    pub async fn upload(
        &self,
        name: &str,
        folder: &FileId,
        data: Vec<u8>,
        mime_type: &str,
        share: &ShareRequest,
    ) -> Result<String> {
        info!("Uploading {} ({} bytes) to folder {}", name, data.len(), folder);

        let file = self
            .client
            .upload_multipart(name, folder, data, mime_type)
            .await?;
        let id = FileId::new(file.id)?;

        self.client
            .grant_permission(&id, &share.grantee, share.role)
            .await?;
        self.client.web_view_link(&id).await
    }

    /// Copy a file into a folder after validating both ends.
    ///
    /// The source is resolved through shortcuts and must be neither trashed
    /// nor copy-restricted; the destination must be an existing, non-trashed
    /// folder that accepts new children. All checks run before the copy is
    /// issued, so a rejection leaves no partial side effect.
    pub async fn copy_validated(
        &self,
        source: &FileId,
        name: &str,
        folder: &FileId,
        mime_type: Option<&str>,
        share: &ShareRequest,
    ) -> Result<String> {
        let src = self.resolve_shortcut(source).await?;
        if src.trashed {
            return Err(Error::InvalidInput(format!(
                "Cannot copy: source file {} is in the trash",
                src.id
            )));
        }
        if !src.capabilities.as_ref().is_some_and(|c| c.can_copy) {
            return Err(Error::PermissionDenied(format!(
                "Source file {} does not allow copying",
                src.id
            )));
        }

        let dest = self.resolve_shortcut(folder).await?;
        if !dest.is_folder() {
            return Err(Error::InvalidInput(format!(
                "Destination {} is not a folder",
                dest.id
            )));
        }
        if dest.trashed {
            return Err(Error::InvalidInput(format!(
                "Destination folder {} is in the trash",
                dest.id
            )));
        }
        if !dest
            .capabilities
            .as_ref()
            .is_some_and(|c| c.can_add_children)
        {
            return Err(Error::PermissionDenied(format!(
                "Destination folder {} does not accept new files",
                dest.id
            )));
        }

        info!("Copying {} into folder {} as {}", src.id, dest.id, name);

        let src_id = FileId::new(src.id)?;
        let dest_id = FileId::new(dest.id)?;
        let copied = self
            .client
            .copy_file(&src_id, name, &dest_id, mime_type)
            .await?;
        let id = FileId::new(copied.id)?;

        self.client
            .grant_permission(&id, &share.grantee, share.role)
            .await?;
        self.client.web_view_link(&id).await
    }

    /// Delete a file, resolving shortcuts to their target first.
    ///
    /// A target already in the trash is permanently deleted; anything else is
    /// moved to the trash as the safety default.
    pub async fn delete(&self, file: &FileId) -> Result<DeleteOutcome> {
        let target = self.resolve_shortcut(file).await?;
        let target_id = FileId::new(target.id)?;

        if target.trashed {
            warn!("File {} already trashed, deleting permanently", target_id);
            self.client.delete_permanent(&target_id).await?;
            Ok(DeleteOutcome::Deleted)
        } else {
            info!("Moving file {} to trash", target_id);
            self.client.trash(&target_id).await?;
            Ok(DeleteOutcome::Trashed)
        }
    }

    /// Export a Workspace document as PDF into a folder, keeping its name,
    /// grant the requested permission and return the view link.
    pub async fn export_pdf(
        &self,
        source: &FileId,
        folder: &FileId,
        share: &ShareRequest,
    ) -> Result<String> {
        let src = self.client.get_file(source).await?;
        info!("Exporting {} as PDF", src.id);

        let content = self.client.export(source, "application/pdf").await?;
        self.upload(&src.name, folder, content, "application/pdf", share)
            .await
    }

    /// List the children of a folder, following continuation tokens until the
    /// provider reports no further pages.
    pub async fn list_folder(
        &self,
        folder: &FileId,
        options: &ListOptions,
    ) -> Result<Vec<DriveFile>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.client.list_page(folder, page_token.as_deref()).await?;
            entries.extend(page.files);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} entries in folder {}", entries.len(), folder);

        entries.retain(|f| {
            (options.include_folders || !f.is_folder())
                && (options.include_shortcuts || !f.is_shortcut())
        });
        Ok(entries)
    }

    /// Fetch a file and follow it through at most one shortcut hop.
    async fn resolve_shortcut(&self, file: &FileId) -> Result<DriveFile> {
        let fetched = self.client.get_file(file).await?;
        if !fetched.is_shortcut() {
            return Ok(fetched);
        }

        let target_id = fetched
            .shortcut_details
            .as_ref()
            .and_then(|d| d.target_id.clone())
            .ok_or_else(|| {
                Error::InvalidInput(format!("Shortcut {} has no target", fetched.id))
            })?;

        debug!("Resolved shortcut {} to {}", fetched.id, target_id);
        self.client.get_file(&FileId::new(target_id)?).await
    }
}
