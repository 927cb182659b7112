//! Google Drive API client.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header;
use serde::{Deserialize, Serialize};

use gworks_auth::Connection;
use gworks_common::http::{decode_json, expect_success};
use gworks_common::{Error, FileId, Result};

/// Google Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// MIME type Drive uses for folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
/// MIME type Drive uses for shortcuts.
pub const SHORTCUT_MIME: &str = "application/vnd.google-apps.shortcut";

/// Field projection requested for file metadata.
const FILE_FIELDS: &str = "id,name,mimeType,size,modifiedTime,trashed,webViewLink,\
                           capabilities(canCopy,canAddChildren),shortcutDetails(targetId)";

/// Boundary for hand-built multipart/related upload bodies.
const UPLOAD_BOUNDARY: &str = "GworksUploadBoundary";

/// Google Drive file metadata from API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// File ID.
    pub id: String,
    /// File name.
    #[serde(default)]
    pub name: String,
    /// MIME type.
    #[serde(default)]
    pub mime_type: String,
    /// File size in bytes (only for binary content).
    #[serde(default)]
    pub size: Option<String>,
    /// Modified time.
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    /// Trashed status.
    #[serde(default)]
    pub trashed: bool,
    /// Browser link to view the file.
    #[serde(default)]
    pub web_view_link: Option<String>,
    /// What the current user may do with the file.
    #[serde(default)]
    pub capabilities: Option<Capabilities>,
    /// Present when the file is a shortcut.
    #[serde(default)]
    pub shortcut_details: Option<ShortcutDetails>,
}

impl DriveFile {
    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }

    /// Check if this is a shortcut to another object.
    pub fn is_shortcut(&self) -> bool {
        self.mime_type == SHORTCUT_MIME
    }

    /// Get size as u64.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_ref().and_then(|s| s.parse().ok())
    }
}

/// Subset of per-file capabilities the facades act on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default)]
    pub can_copy: bool,
    #[serde(default)]
    pub can_add_children: bool,
}

/// Shortcut target reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutDetails {
    #[serde(default)]
    pub target_id: Option<String>,
}

/// One page from listing files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Role granted when a file is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionRole {
    #[default]
    Reader,
    Commenter,
    Writer,
}

impl PermissionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Commenter => "commenter",
            Self::Writer => "writer",
        }
    }
}

impl FromStr for PermissionRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reader" => Ok(Self::Reader),
            "commenter" => Ok(Self::Commenter),
            "writer" => Ok(Self::Writer),
            other => Err(Error::InvalidInput(format!(
                "Unknown permission role: {}",
                other
            ))),
        }
    }
}

/// Who a permission is granted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grantee {
    /// Anyone with the link.
    Anyone,
    /// A named user account.
    User(String),
}

impl Grantee {
    /// `Anyone` when no account is given, else a named-user grant.
    pub fn from_account(account: Option<String>) -> Self {
        match account {
            Some(email) => Self::User(email),
            None => Self::Anyone,
        }
    }
}

/// Google Drive API client.
pub struct DriveClient {
    conn: Arc<Connection>,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    /// Create a new Drive client on a shared connection.
    pub fn new(conn: Arc<Connection>) -> Self {
        Self {
            conn,
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
        }
    }

    /// Create a client pointed at non-default endpoints (tests, staging).
    pub fn with_endpoints(
        conn: Arc<Connection>,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            api_base: api_base.into(),
            upload_base: upload_base.into(),
        }
    }

    /// Get authorization header.
    async fn auth_header(&self) -> Result<String> {
        let token = self.conn.bearer_token().await?;
        Ok(format!("Bearer {}", token))
    }

    /// Get file metadata by ID.
    pub async fn get_file(&self, file_id: &FileId) -> Result<DriveFile> {
        let url = format!("{}/files/{}", self.api_base, file_id);
        let auth = self.auth_header().await?;

        let response = self
            .conn
            .http()
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("fields", FILE_FIELDS)])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to get file: {}", e)))?;

        decode_json(response).await
    }

    /// Fetch one page of the children of a folder.
    pub async fn list_page(
        &self,
        folder_id: &FileId,
        page_token: Option<&str>,
    ) -> Result<FileList> {
        let url = format!("{}/files", self.api_base);
        let auth = self.auth_header().await?;

        let query = format!("'{}' in parents and trashed = false", folder_id);
        let fields = format!("nextPageToken,files({})", FILE_FIELDS);

        let mut request = self
            .conn
            .http()
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[
                ("q", query.as_str()),
                ("fields", fields.as_str()),
                ("pageSize", "1000"),
            ]);

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to list folder: {}", e)))?;

        decode_json(response).await
    }

    /// Upload file content with its metadata in one multipart request.
    pub async fn upload_multipart(
        &self,
        name: &str,
        folder_id: &FileId,
        data: Vec<u8>,
        mime_type: &str,
    ) -> Result<DriveFile> {
        let url = format!("{}/files", self.upload_base);
        let auth = self.auth_header().await?;

        let metadata = serde_json::json!({
            "name": name,
            "parents": [folder_id.as_str()],
            "mimeType": mime_type,
        });
        let metadata_json = serde_json::to_string(&metadata)
            .map_err(|e| Error::Serialization(format!("Failed to serialize metadata: {}", e)))?;

        // Build multipart/related body: metadata part, then content part.
        let mut body = Vec::with_capacity(data.len() + metadata_json.len() + 256);
        body.extend_from_slice(format!("--{}\r\n", UPLOAD_BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata_json.as_bytes());
        body.extend_from_slice(b"\r\n");

        body.extend_from_slice(format!("--{}\r\n", UPLOAD_BOUNDARY).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");

        body.extend_from_slice(format!("--{}--", UPLOAD_BOUNDARY).as_bytes());

        let response = self
            .conn
            .http()
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", UPLOAD_BOUNDARY),
            )
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to upload file: {}", e)))?;

        decode_json(response).await
    }

    /// Copy a file into a folder under a new name.
    ///
    /// When `mime_type` is given the copy is converted to that type.
    pub async fn copy_file(
        &self,
        file_id: &FileId,
        name: &str,
        folder_id: &FileId,
        mime_type: Option<&str>,
    ) -> Result<DriveFile> {
        let url = format!("{}/files/{}/copy", self.api_base, file_id);
        let auth = self.auth_header().await?;

        let mut metadata = serde_json::json!({
            "name": name,
            "parents": [folder_id.as_str()],
        });
        if let Some(mime) = mime_type {
            metadata["mimeType"] = serde_json::json!(mime);
        }

        let response = self
            .conn
            .http()
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/json")
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to copy file: {}", e)))?;

        decode_json(response).await
    }

    /// Export a Workspace document in the given format.
    pub async fn export(&self, file_id: &FileId, mime_type: &str) -> Result<Vec<u8>> {
        let url = format!("{}/files/{}/export", self.api_base, file_id);
        let auth = self.auth_header().await?;

        let response = self
            .conn
            .http()
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("mimeType", mime_type), ("alt", "media")])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to export file: {}", e)))?;

        let response = expect_success(response).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::Network(format!("Failed to read export response: {}", e)))
    }

    /// Delete a file permanently, bypassing the trash.
    pub async fn delete_permanent(&self, file_id: &FileId) -> Result<()> {
        let url = format!("{}/files/{}", self.api_base, file_id);
        let auth = self.auth_header().await?;

        let response = self
            .conn
            .http()
            .delete(&url)
            .header(header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to delete file: {}", e)))?;

        expect_success(response).await?;
        Ok(())
    }

    /// Move a file to the trash.
    pub async fn trash(&self, file_id: &FileId) -> Result<()> {
        let url = format!("{}/files/{}", self.api_base, file_id);
        let auth = self.auth_header().await?;

        let response = self
            .conn
            .http()
            .patch(&url)
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/json")
            .query(&[("fields", "id")])
            .json(&serde_json::json!({ "trashed": true }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to trash file: {}", e)))?;

        expect_success(response).await?;
        Ok(())
    }

    /// Grant a permission on a file.
    pub async fn grant_permission(
        &self,
        file_id: &FileId,
        grantee: &Grantee,
        role: PermissionRole,
    ) -> Result<()> {
        let url = format!("{}/files/{}/permissions", self.api_base, file_id);
        let auth = self.auth_header().await?;

        let permission = match grantee {
            Grantee::Anyone => serde_json::json!({
                "type": "anyone",
                "role": role.as_str(),
            }),
            Grantee::User(email) => serde_json::json!({
                "type": "user",
                "role": role.as_str(),
                "emailAddress": email,
            }),
        };

        let response = self
            .conn
            .http()
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/json")
            .query(&[("fields", "id")])
            .json(&permission)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to grant permission: {}", e)))?;

        expect_success(response).await?;
        Ok(())
    }

    /// Fetch the browser view link of a file.
    pub async fn web_view_link(&self, file_id: &FileId) -> Result<String> {
        let url = format!("{}/files/{}", self.api_base, file_id);
        let auth = self.auth_header().await?;

        let response = self
            .conn
            .http()
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("fields", "webViewLink")])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to get file link: {}", e)))?;

        let file: DriveFile = decode_json(response).await?;
        file.web_view_link
            .ok_or_else(|| Error::NotFound(format!("File {} has no view link", file_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(mime: &str, trashed: bool) -> DriveFile {
        DriveFile {
            id: "1".to_string(),
            name: "x".to_string(),
            mime_type: mime.to_string(),
            size: None,
            modified_time: None,
            trashed,
            web_view_link: None,
            capabilities: None,
            shortcut_details: None,
        }
    }

    #[test]
    fn test_drive_file_kind_checks() {
        assert!(file(FOLDER_MIME, false).is_folder());
        assert!(file(SHORTCUT_MIME, false).is_shortcut());

        let plain = file("text/plain", false);
        assert!(!plain.is_folder());
        assert!(!plain.is_shortcut());
    }

    #[test]
    fn test_drive_file_size_bytes() {
        let mut f = file("text/plain", false);
        f.size = Some("12345".to_string());
        assert_eq!(f.size_bytes(), Some(12345));

        assert_eq!(file(FOLDER_MIME, false).size_bytes(), None);
    }

    #[test]
    fn test_drive_file_deserializes_wire_shape() {
        let json = r#"{
            "id": "abc123",
            "name": "report",
            "mimeType": "application/vnd.google-apps.document",
            "trashed": false,
            "webViewLink": "https://docs.google.com/document/d/abc123",
            "capabilities": {"canCopy": true, "canAddChildren": false},
            "shortcutDetails": {"targetId": "target456"}
        }"#;

        let f: DriveFile = serde_json::from_str(json).unwrap();
        assert_eq!(f.id, "abc123");
        assert!(f.capabilities.as_ref().unwrap().can_copy);
        assert!(!f.capabilities.as_ref().unwrap().can_add_children);
        assert_eq!(
            f.shortcut_details.unwrap().target_id.as_deref(),
            Some("target456")
        );
    }

    #[test]
    fn test_permission_role_parsing() {
        assert_eq!(
            "writer".parse::<PermissionRole>().unwrap(),
            PermissionRole::Writer
        );
        assert_eq!(PermissionRole::default(), PermissionRole::Reader);
        assert!("owner".parse::<PermissionRole>().is_err());
    }

    #[test]
    fn test_grantee_from_account() {
        assert_eq!(Grantee::from_account(None), Grantee::Anyone);
        assert_eq!(
            Grantee::from_account(Some("user@example.com".to_string())),
            Grantee::User("user@example.com".to_string())
        );
    }
}
