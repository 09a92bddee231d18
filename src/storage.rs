//! Blob store for uploaded ticket files.
//!
//! Objects are written under the configured directory as
//! `<unix-millis>_<sanitized-name>` and exposed back over HTTP at
//! `<public_base_url>/uploads/<name>`.

use std::{ffi::OsStr, io, path::Path, path::PathBuf};

use async_trait::async_trait;
use derive_more::From;
use time::OffsetDateTime;
use tokio::fs;

use crate::{config, workflow};

/// Extensions accepted for uploaded tickets, lowercase.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "pdf"];

pub struct Store {
    dir: PathBuf,
    public_base_url: String,
}

impl Store {
    pub fn new(config: config::Storage) -> Self {
        Self {
            dir: config.dir,
            public_base_url: config.public_base_url,
        }
    }

    /// Writes the bytes under a collision-resistant name and returns the
    /// public URL.
    pub async fn put_upload(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, Error> {
        let now = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let name = object_name(now, file_name);

        fs::create_dir_all(&self.dir).await?;
        fs::write(self.dir.join(&name), bytes).await?;

        Ok(format!("{}/uploads/{name}", self.public_base_url))
    }
}

#[async_trait]
impl workflow::ObjectStore for Store {
    async fn put_upload(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, Error> {
        Store::put_upload(self, file_name, bytes).await
    }
}

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Io(io::Error),
}

pub fn has_allowed_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
        })
}

fn object_name(timestamp_millis: i128, file_name: &str) -> String {
    format!("{timestamp_millis}_{}", sanitize_file_name(file_name))
}

/// Keeps `[A-Za-z0-9.-_]`, replaces everything else with `_`.
fn sanitize_file_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        has_allowed_extension, object_name, sanitize_file_name, Store,
    };
    use crate::config;

    #[test]
    fn sanitizes_file_names() {
        assert_eq!(
            sanitize_file_name("my ticket (1).pdf"),
            "my_ticket__1_.pdf",
        );
        assert_eq!(sanitize_file_name("photo.jpg"), "photo.jpg");
        assert_eq!(sanitize_file_name("multa año.png"), "multa_a_o.png");
    }

    #[test]
    fn prefixes_objects_with_the_timestamp() {
        assert_eq!(
            object_name(1700000000000, "scan 1.pdf"),
            "1700000000000_scan_1.pdf",
        );
    }

    #[test]
    fn allow_lists_extensions_case_insensitively() {
        assert!(has_allowed_extension("PHOTO.JPG"));
        assert!(has_allowed_extension("scan.pdf"));
        assert!(has_allowed_extension("a.jpeg"));
        assert!(!has_allowed_extension("malware.exe"));
        assert!(!has_allowed_extension("noextension"));
        assert!(!has_allowed_extension(""));
    }

    #[tokio::test]
    async fn stores_bytes_and_returns_a_public_url() {
        let dir = std::env::temp_dir()
            .join(format!("ticket-solver-test-{}", std::process::id()));
        let store = Store::new(config::Storage {
            dir: dir.clone(),
            public_base_url: "https://example.com".to_owned(),
        });

        let url = store.put_upload("my scan.pdf", b"%PDF-").await.unwrap();
        assert!(url.starts_with("https://example.com/uploads/"));
        assert!(url.ends_with("_my_scan.pdf"));

        let name = url.rsplit('/').next().unwrap();
        let stored = tokio::fs::read(dir.join(name)).await.unwrap();
        assert_eq!(stored, b"%PDF-");

        tokio::fs::remove_dir_all(dir).await.unwrap();
    }
}
