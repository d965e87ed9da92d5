use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

use crate::drive::FileSource;
use crate::parser::post::{ContentBlock, Post};

static DRIVE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"drive\.google\.com.*(?:/d/|id=)([a-zA-Z0-9_-]{25,})").unwrap()
});
static FILE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{25,}$").unwrap());

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid file id: {0:?}")]
    InvalidFileId(String),
    #[error("failed to write image {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to download {id}: {message}")]
    Download { id: String, message: String },
}

/// Drive file id referenced by a sharing/view URL, if it is one.
pub fn extract_file_id(url: &str) -> Option<&str> {
    DRIVE_URL_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub fn file_name(id: &str) -> String {
    format!("{id}.png")
}

/// Download `id` into `dir` unless it is already there. Returns the stored path.
pub async fn store_image<S: FileSource>(
    source: &S,
    id: &str,
    dir: &Path,
) -> Result<PathBuf, ImageError> {
    if !FILE_ID_RE.is_match(id) {
        return Err(ImageError::InvalidFileId(id.to_string()));
    }

    let dest = dir.join(file_name(id));
    if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
        info!("Skipping {}, file already exists", id);
        return Ok(dest);
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| ImageError::Write {
            path: dir.to_path_buf(),
            source,
        })?;

    let bytes = source
        .download_file(id)
        .await
        .map_err(|e| ImageError::Download {
            id: id.to_string(),
            message: format!("{e:#}"),
        })?;

    // only a complete download may appear under the final name
    let partial = dir.join(format!("{}.tmp", file_name(id)));
    tokio::fs::write(&partial, &bytes)
        .await
        .map_err(|source| ImageError::Write {
            path: partial.clone(),
            source,
        })?;
    tokio::fs::rename(&partial, &dest)
        .await
        .map_err(|source| ImageError::Write {
            path: dest.clone(),
            source,
        })?;
    info!("Downloaded {} to {}", id, dest.display());
    Ok(dest)
}

/// Copy of `post` with every URL found in `replacements` swapped for its
/// local counterpart. Other URLs are left as they are.
pub fn rewrite_images(post: &Post, replacements: &HashMap<String, String>) -> Post {
    let swap = |url: &str| {
        replacements
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string())
    };

    let mut out = post.clone();
    if !out.title_image.is_empty() {
        out.title_image = swap(&out.title_image);
    }
    for block in out.body.iter_mut().flat_map(|s| s.content.iter_mut()) {
        if let ContentBlock::Image { url } = block {
            *url = swap(url.as_str());
        }
    }
    out
}

/// Download every drive-hosted image referenced by `post` and return a copy
/// pointing at the local files. Failed downloads keep their remote URL.
pub async fn localize_post<S: FileSource>(
    source: &S,
    post: &Post,
    dir: &Path,
    public_url: impl Fn(&str) -> String,
) -> Post {
    let mut replacements = HashMap::new();

    for url in post.image_urls() {
        if replacements.contains_key(url) {
            continue;
        }
        let Some(id) = extract_file_id(url) else {
            continue;
        };
        match store_image(source, id, dir).await {
            Ok(_) => {
                replacements.insert(url.to_string(), public_url(&file_name(id)));
            }
            Err(e) => warn!("Keeping remote image for post {}: {}", post.id, e),
        }
    }

    rewrite_images(post, &replacements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::post::Section;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COVER_ID: &str = "1CoverImageFileId_abcdefghijk";
    const SHOT_ID: &str = "1ScreenshotFileId_abcdefghij";

    struct FakeSource {
        downloads: AtomicUsize,
        fail: bool,
    }

    impl FakeSource {
        fn new(fail: bool) -> Self {
            Self {
                downloads: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl FileSource for FakeSource {
        async fn download_file(&self, id: &str) -> anyhow::Result<Vec<u8>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("403 for {id}");
            }
            Ok(id.as_bytes().to_vec())
        }
    }

    fn post() -> Post {
        Post {
            id: "p1".into(),
            title_image: format!("https://drive.google.com/file/d/{COVER_ID}/view?usp=sharing"),
            body: vec![Section {
                heading: Some("Pics".into()),
                content: vec![
                    ContentBlock::Image {
                        url: format!("https://drive.google.com/open?id={SHOT_ID}"),
                    },
                    ContentBlock::Image {
                        url: "https://example.com/elsewhere.png".into(),
                    },
                    ContentBlock::Image {
                        url: format!("https://drive.google.com/open?id={SHOT_ID}"),
                    },
                ],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn extracts_ids_from_drive_urls() {
        assert_eq!(
            extract_file_id(&format!("https://drive.google.com/file/d/{COVER_ID}/view")),
            Some(COVER_ID)
        );
        assert_eq!(
            extract_file_id(&format!("https://drive.google.com/open?id={SHOT_ID}")),
            Some(SHOT_ID)
        );
        assert_eq!(extract_file_id("https://drive.google.com/file/d/short/view"), None);
        assert_eq!(extract_file_id(&format!("https://example.com/d/{COVER_ID}")), None);
    }

    #[tokio::test]
    async fn rejects_invalid_ids() {
        let dir = tempfile::tempdir().unwrap();
        let err = store_image(&FakeSource::new(false), "../etc/passwd", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::InvalidFileId(_)));
    }

    #[tokio::test]
    async fn stores_once_and_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(false);
        let images = dir.path().join("images");

        let path = store_image(&source, COVER_ID, &images).await.unwrap();
        assert_eq!(path, images.join(format!("{COVER_ID}.png")));
        assert_eq!(std::fs::read(&path).unwrap(), COVER_ID.as_bytes());

        store_image(&source, COVER_ID, &images).await.unwrap();
        assert_eq!(source.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn leftover_partial_download_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(false);
        let partial = dir.path().join(format!("{COVER_ID}.png.tmp"));
        std::fs::write(&partial, b"trunc").unwrap();

        let path = store_image(&source, COVER_ID, dir.path()).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), COVER_ID.as_bytes());
        assert!(!partial.exists());
        assert_eq!(source.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_download_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let err = store_image(&FakeSource::new(true), COVER_ID, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::Download { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn localizes_drive_images_only() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(false);
        let original = post();

        let local = localize_post(&source, &original, dir.path(), |f| format!("/images/{f}")).await;

        assert_eq!(local.title_image, format!("/images/{COVER_ID}.png"));
        let urls: Vec<_> = local.image_urls().skip(1).collect();
        assert_eq!(
            urls,
            vec![
                format!("/images/{SHOT_ID}.png").as_str(),
                "https://example.com/elsewhere.png",
                format!("/images/{SHOT_ID}.png").as_str(),
            ]
        );
        assert_eq!(source.downloads.load(Ordering::SeqCst), 2);
        // the input is untouched
        assert_eq!(original, post());
    }

    #[tokio::test]
    async fn failed_download_keeps_remote_url() {
        let dir = tempfile::tempdir().unwrap();
        let local = localize_post(&FakeSource::new(true), &post(), dir.path(), |f| f.to_string()).await;
        assert_eq!(local, post());
    }
}
