//! Multi-file upload aggregation for posted form files.

use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use gworks_common::{FileId, Result};

use crate::ops::{Drive, ShareRequest};

/// Fallback when the MIME type cannot be guessed from the filename.
const OCTET_STREAM: &str = "application/octet-stream";

/// One file posted through an HTTP form.
///
/// An explicit description of the upload input: the form field it arrived
/// under, the filename the client supplied, and where the server staged the
/// content.
#[derive(Debug, Clone)]
pub struct PostedFile {
    /// Form field name the file was posted under.
    pub field_name: String,
    /// Original filename as uploaded by the client.
    pub file_name: String,
    /// Server-side temporary path holding the content. An empty path marks a
    /// slot the HTTP layer received without content; it is skipped.
    pub tmp_path: PathBuf,
}

/// Options applied to an aggregated upload.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Caller-supplied base filename; see [`plan_names`] for how it combines
    /// with the number of files.
    pub base_name: Option<String>,
    /// Sharing applied to each uploaded file.
    pub share: ShareRequest,
}

/// Result of one uploaded file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_name: String,
    pub web_link: String,
}

/// Decide the upload name of each usable posted file.
///
/// Returns `(index into files, final name)` pairs in submission order.
/// Naming policy: with several files and a base name, each file gets a
/// two-digit zero-padded sequence prefix (`00_base`, `01_base`, ...); with a
/// single file the base name is used as-is; without a base name the original
/// filenames are kept.
pub fn plan_names(files: &[PostedFile], base_name: Option<&str>) -> Vec<(usize, String)> {
    let usable: Vec<usize> = files
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.tmp_path.as_os_str().is_empty())
        .map(|(i, _)| i)
        .collect();

    let several = usable.len() > 1;

    usable
        .into_iter()
        .enumerate()
        .map(|(seq, idx)| {
            let name = match base_name {
                Some(base) if !base.is_empty() => {
                    if several {
                        format!("{:02}_{}", seq, base)
                    } else {
                        base.to_string()
                    }
                }
                _ => files[idx].file_name.clone(),
            };
            (idx, name)
        })
        .collect()
}

impl Drive {
    /// Upload a batch of posted files into a folder.
    ///
    /// Each file is an independent unit of work: a failure on file *N*
    /// propagates without rolling back files *1..N-1* already uploaded.
    /// Returns `None` when no usable files were posted.
    pub async fn upload_posted(
        &self,
        files: &[PostedFile],
        folder: &FileId,
        options: &UploadOptions,
    ) -> Result<Option<Vec<UploadedFile>>> {
        let plan = plan_names(files, options.base_name.as_deref());
        if plan.is_empty() {
            debug!("No usable posted files, nothing to upload");
            return Ok(None);
        }

        let mut uploaded = Vec::with_capacity(plan.len());
        for (idx, name) in plan {
            let posted = &files[idx];
            let data = tokio::fs::read(&posted.tmp_path).await?;
            let mime_type = mime_guess::from_path(&posted.file_name)
                .first_raw()
                .unwrap_or(OCTET_STREAM);

            let web_link = self
                .upload(&name, folder, data, mime_type, &options.share)
                .await?;
            uploaded.push(UploadedFile {
                file_name: name,
                web_link,
            });
        }

        Ok(Some(uploaded))
    }
}
