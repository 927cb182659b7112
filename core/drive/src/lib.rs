//! Google Drive v3 facade.
//!
//! Task-oriented operations over the Drive REST API:
//! - multipart upload with a link-sharing grant, single file or aggregated
//!   multi-file form submissions
//! - copy with shortcut resolution and fail-fast source/destination checks
//! - trash-aware delete
//! - export of Workspace documents to PDF
//! - folder listing with transparent pagination
//!
//! All operations go through a shared [`gworks_auth::Connection`].

pub mod client;
pub mod ops;
pub mod upload;

pub use client::{Capabilities, DriveClient, DriveFile, Grantee, PermissionRole};
pub use ops::{DeleteOutcome, Drive, ListOptions, ShareRequest};
pub use upload::{PostedFile, UploadOptions, UploadedFile};
