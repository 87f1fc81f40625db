//! Object-storage staging for remote analysis.
//!
//! This crate provides:
//! - The [`ObjectStager`] seam and the scoped [`StagedObject`] handle
//! - An S3-compatible stager with presigned GET URLs
//! - A GCS stager handing out `gs://` URIs
//! - Cached Google Cloud access tokens

pub mod auth;
pub mod error;
pub mod gcs;
pub mod s3;
pub mod stager;

pub use auth::{AccessTokenSource, StaticToken, TokenCache, CLOUD_PLATFORM_SCOPE};
pub use error::{StorageError, StorageResult};
pub use gcs::{GcsStager, GcsStagingConfig};
pub use s3::{S3Stager, S3StagingConfig};
pub use stager::{content_type_for, with_staged_object, ObjectStager, StagedObject};
