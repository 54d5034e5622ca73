//! Folder management, size limits, thumbnails and transfers.

mod common;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use common::{assert_no_staging, entries, no_cancel, setup, OTHER_WRITE_PASSWORD};
use folderkeep::config::DownloadConfig;
use folderkeep::{
    AccessKind, CancellationToken, CapabilityToken, Downloader, FolderConfig, GeneratedThumbnail,
    Store, StoreError, ThumbnailGenerator, UploadRequest,
};

const MB: usize = 1024 * 1024;

fn stored_artifacts(dir: &Path) -> Vec<String> {
    entries(dir)
        .into_iter()
        .filter(|n| n.ends_with(".json") || n.ends_with(".bin"))
        .collect()
}

#[tokio::test]
async fn test_create_subfolder() {
    let ts = setup().await;
    let writer = ts.gallery_writer().await;

    let child = ts
        .store
        .create_subfolder("gallery", &writer, "2024")
        .await
        .unwrap();
    assert_eq!(child.rel_path, "gallery/2024");
    assert_eq!(child.config_root_path, "gallery");
    assert!(!child.owns_config());

    let owner = ts.gallery_owner().await;
    let listing = ts.store.list("gallery", &owner, &no_cancel()).await.unwrap();
    assert_eq!(listing.subfolders, vec!["2024".to_string(), "sub".to_string()]);

    let result = ts.store.create_subfolder("gallery", &writer, "2024").await;
    assert_eq!(result.unwrap_err(), StoreError::FileAlreadyExists);

    let result = ts.store.create_subfolder("gallery", &writer, "a/b").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_create_subfolder_disabled() {
    let ts = setup().await;
    let writer = ts
        .store
        .authenticate("other", AccessKind::Write, OTHER_WRITE_PASSWORD)
        .await
        .unwrap();

    let result = ts.store.create_subfolder("other", &writer, "nested").await;
    assert_eq!(result.unwrap_err(), StoreError::SubfoldersDisabled);
    assert!(!ts.root().join("other/nested").exists());
}

#[tokio::test]
async fn test_create_subfolder_needs_write_access() {
    let ts = setup().await;

    let result = ts
        .store
        .create_subfolder("gallery", &CapabilityToken::new(), "x")
        .await;
    assert!(matches!(result, Err(StoreError::NoWriteAccess { .. })));
}

#[tokio::test]
async fn test_delete_subfolder() {
    let ts = setup().await;
    let owner = ts.gallery_owner().await;

    ts.store
        .upload("gallery/sub", &owner, UploadRequest::new("a.txt"), &b"a"[..], &no_cancel())
        .await
        .unwrap();
    let result = ts.store.delete_subfolder("gallery", &owner, "sub").await;
    assert_eq!(result.unwrap_err(), StoreError::FolderNotEmpty);

    ts.store.delete("gallery/sub", &owner, "a.txt").await.unwrap();
    ts.store
        .delete_subfolder("gallery", &owner, "sub")
        .await
        .unwrap();

    assert!(!ts.root().join("gallery/sub").exists());
    let listing = ts.store.list("gallery", &owner, &no_cancel()).await.unwrap();
    assert!(listing.subfolders.is_empty());

    let result = ts.store.delete_subfolder("gallery", &owner, "sub").await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_subfolder_with_nested_folder() {
    let ts = setup().await;
    let owner = ts.gallery_owner().await;
    ts.store
        .create_subfolder("gallery/sub", &owner, "deeper")
        .await
        .unwrap();

    let result = ts.store.delete_subfolder("gallery", &owner, "sub").await;
    assert_eq!(result.unwrap_err(), StoreError::FolderNotEmpty);
}

#[tokio::test]
async fn test_delete_subfolder_owning_config() {
    let ts = setup().await;
    let owner = ts.gallery_owner().await;
    ts.store
        .init_folder(
            "gallery/private",
            FolderConfig::with_passwords("", "Separate-Owner-Secret-5").unwrap(),
        )
        .await
        .unwrap();

    // Write access to the parent is not enough.
    let result = ts.store.delete_subfolder("gallery", &owner, "private").await;
    assert!(matches!(result, Err(StoreError::NoWriteAccess { .. })));
    assert!(ts.root().join("gallery/private").exists());

    let mut both = owner.clone();
    both.merge(
        ts.store
            .authenticate("gallery/private", AccessKind::Write, "Separate-Owner-Secret-5")
            .await
            .unwrap(),
    );
    ts.store
        .delete_subfolder("gallery", &both, "private")
        .await
        .unwrap();
    assert!(!ts.root().join("gallery/private").exists());
}

#[tokio::test]
async fn test_per_file_limit() {
    let ts = setup().await;
    ts.store
        .init_folder(
            "limited",
            FolderConfig::with_passwords("", "Limited-Writer-Secret-8")
                .unwrap()
                .with_limits(1, 0),
        )
        .await
        .unwrap();
    let writer = ts
        .store
        .authenticate("limited", AccessKind::Write, "Limited-Writer-Secret-8")
        .await
        .unwrap();

    let too_big = vec![0u8; MB + 1];
    let result = ts
        .store
        .upload("limited", &writer, UploadRequest::new("big.bin"), too_big.as_slice(), &no_cancel())
        .await;
    assert_eq!(result.unwrap_err(), StoreError::SizeLimitExceeded);
    assert!(stored_artifacts(&ts.root().join("limited")).is_empty());
    assert_no_staging(ts.root());

    let exact = vec![0u8; MB];
    assert!(ts
        .store
        .upload("limited", &writer, UploadRequest::new("ok.bin"), exact.as_slice(), &no_cancel())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_folder_quota() {
    let ts = setup().await;
    ts.store
        .init_folder(
            "quota",
            FolderConfig::with_passwords("", "Quota-Writer-Secret-3")
                .unwrap()
                .with_limits(0, 2),
        )
        .await
        .unwrap();
    let writer = ts
        .store
        .authenticate("quota", AccessKind::Write, "Quota-Writer-Secret-3")
        .await
        .unwrap();

    let chunk = vec![0u8; MB];
    for name in ["one.bin", "two.bin"] {
        ts.store
            .upload("quota", &writer, UploadRequest::new(name), chunk.as_slice(), &no_cancel())
            .await
            .unwrap();
    }

    let result = ts
        .store
        .upload("quota", &writer, UploadRequest::new("three.bin"), &b"x"[..], &no_cancel())
        .await;
    assert_eq!(result.unwrap_err(), StoreError::SizeLimitExceeded);
    assert_eq!(stored_artifacts(&ts.root().join("quota")).len(), 4);

    // Replacing a file frees its own share of the quota.
    ts.store
        .upload(
            "quota",
            &writer,
            UploadRequest::new("two.bin").with_overwrite(true),
            chunk.as_slice(),
            &no_cancel(),
        )
        .await
        .unwrap();
}

struct FixedGenerator {
    calls: AtomicUsize,
}

impl ThumbnailGenerator for FixedGenerator {
    async fn generate(
        &self,
        _path: &Path,
        mime: &str,
        max_width: u32,
    ) -> folderkeep::Result<GeneratedThumbnail> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !mime.starts_with("image/") {
            return Err(StoreError::UnsupportedFormat);
        }
        Ok(GeneratedThumbnail {
            data: vec![0xff, 0xd8, 0xff],
            mime: "image/jpeg".to_string(),
            width: max_width,
            height: max_width,
        })
    }
}

#[tokio::test]
async fn test_thumbnail_through_store() {
    let ts = setup().await;
    let owner = ts.gallery_owner().await;
    ts.store
        .upload(
            "gallery",
            &owner,
            UploadRequest::new("pic.png").with_mime("image/png"),
            &b"pixels"[..],
            &no_cancel(),
        )
        .await
        .unwrap();
    ts.store
        .upload("gallery", &owner, UploadRequest::new("notes.txt"), &b"text"[..], &no_cancel())
        .await
        .unwrap();

    let generator = FixedGenerator {
        calls: AtomicUsize::new(0),
    };
    let store = Store::new(ts.root()).with_thumbnail_settings(64, Duration::from_secs(3600));

    let first = store
        .thumbnail("gallery", &owner, "pic.png", &generator, &no_cancel())
        .await
        .unwrap();
    assert_eq!(first.width, 64);
    let second = store
        .thumbnail("gallery", &owner, "pic.png", &generator, &no_cancel())
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    for _ in 0..2 {
        let result = store
            .thumbnail("gallery", &owner, "notes.txt", &generator, &no_cancel())
            .await;
        assert_eq!(result.unwrap_err(), StoreError::UnsupportedFormat);
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);

    let result = store
        .thumbnail("gallery", &CapabilityToken::new(), "pic.png", &generator, &no_cancel())
        .await;
    assert!(matches!(result, Err(StoreError::NoReadAccess { .. })));
}

#[tokio::test]
async fn test_thumbnail_of_public_file() {
    let ts = setup().await;
    let owner = ts.gallery_owner().await;
    ts.store
        .upload(
            "gallery",
            &owner,
            UploadRequest::new("poster.png")
                .with_mime("image/png")
                .with_public(true),
            &b"pixels"[..],
            &no_cancel(),
        )
        .await
        .unwrap();

    let generator = FixedGenerator {
        calls: AtomicUsize::new(0),
    };
    let record = ts
        .store
        .thumbnail("gallery", &CapabilityToken::new(), "poster.png", &generator, &no_cancel())
        .await
        .unwrap();
    assert!(!record.is_negative());
}

#[tokio::test]
async fn test_cancelled_thumbnail() {
    let ts = setup().await;
    let owner = ts.gallery_owner().await;
    ts.store
        .upload(
            "gallery",
            &owner,
            UploadRequest::new("pic.png").with_mime("image/png"),
            &b"pixels"[..],
            &no_cancel(),
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let generator = FixedGenerator {
        calls: AtomicUsize::new(0),
    };
    let result = ts
        .store
        .thumbnail("gallery", &owner, "pic.png", &generator, &cancel)
        .await;
    assert_eq!(result.unwrap_err(), StoreError::Cancelled);

    let opened = ts.store.open_file("gallery", "pic.png", &owner).await.unwrap();
    assert!(opened.file.thumbnail.is_none());
}

#[tokio::test]
async fn test_cancelled_upload_leaves_nothing() {
    let ts = setup().await;
    let owner = ts.gallery_owner().await;

    // The writer half stays open so the upload blocks mid-stream.
    let (mut tx, rx) = tokio::io::duplex(64);
    tx.write_all(b"partial content").await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = ts
        .store
        .upload("gallery", &owner, UploadRequest::new("stream.bin"), rx, &cancel)
        .await;
    assert_eq!(result.unwrap_err(), StoreError::Cancelled);

    assert!(stored_artifacts(&ts.root().join("gallery")).is_empty());
    assert_no_staging(ts.root());
    assert!(!ts.store.locks().is_held("gallery"));
    drop(tx);

    let listing = ts.store.list("gallery", &owner, &no_cancel()).await.unwrap();
    assert!(listing.files.is_empty());
}

#[tokio::test]
async fn test_download_disabled() {
    let ts = setup().await;
    let owner = ts.gallery_owner().await;

    let result = ts
        .store
        .download_to_folder("gallery", &owner, "https://example.com/a.png", None, &no_cancel())
        .await;
    assert!(matches!(result, Err(StoreError::Download(_))));
}

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

/// Answer one HTTP request with `body` under the given headers. When `body`
/// is shorter than `content_length` the connection stays open, stalling the
/// client mid-body.
async fn serve_once(content_type: &str, content_length: usize, body: Vec<u8>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\n\
         Content-Length: {content_length}\r\nConnection: close\r\n\r\n"
    );

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        if socket.write_all(&body).await.is_err() {
            return;
        }
        if body.len() < content_length {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    });

    addr
}

fn downloading_store(root: &Path) -> Store {
    let config = DownloadConfig {
        allow_private_hosts: true,
        ..Default::default()
    };
    Store::new(root).with_downloader(Downloader::new(&config).unwrap())
}

#[tokio::test]
async fn test_download_sniffs_generic_type() {
    let ts = setup().await;
    let owner = ts.gallery_owner().await;
    let store = downloading_store(ts.root());
    let addr = serve_once("application/octet-stream", PNG.len(), PNG.to_vec()).await;

    let file = store
        .download_to_folder(
            "gallery",
            &owner,
            &format!("http://{addr}/photos/a%20b.dat"),
            None,
            &no_cancel(),
        )
        .await
        .unwrap();

    assert_eq!(file.name, "a b.dat");
    assert_eq!(file.mime, "image/png");
    assert_eq!(file.size, PNG.len() as u64);
    assert_eq!(stored_artifacts(&ts.root().join("gallery")).len(), 2);
    assert_no_staging(ts.root());

    let opened = store.open_file("gallery", "a b.dat", &owner).await.unwrap();
    assert_eq!(opened.file.mime, "image/png");
}

#[tokio::test]
async fn test_download_keeps_declared_type() {
    let ts = setup().await;
    let owner = ts.gallery_owner().await;
    let store = downloading_store(ts.root());
    let body = b"plain words".to_vec();
    let addr = serve_once("Text/Plain; charset=utf-8", body.len(), body).await;

    let file = store
        .download_to_folder(
            "gallery",
            &owner,
            &format!("http://{addr}/notes"),
            Some("notes.md"),
            &no_cancel(),
        )
        .await
        .unwrap();

    assert_eq!(file.name, "notes.md");
    assert_eq!(file.mime, "text/plain");
}

#[tokio::test]
async fn test_download_declared_length_over_limit() {
    let ts = setup().await;
    ts.store
        .init_folder(
            "limited",
            FolderConfig::with_passwords("", "Limited-Writer-Secret-8")
                .unwrap()
                .with_limits(1, 0),
        )
        .await
        .unwrap();
    let writer = ts
        .store
        .authenticate("limited", AccessKind::Write, "Limited-Writer-Secret-8")
        .await
        .unwrap();
    let store = downloading_store(ts.root());
    let addr = serve_once("image/png", 2 * MB, PNG.to_vec()).await;

    let result = store
        .download_to_folder(
            "limited",
            &writer,
            &format!("http://{addr}/huge.png"),
            None,
            &no_cancel(),
        )
        .await;

    assert_eq!(result.unwrap_err(), StoreError::SizeLimitExceeded);
    assert!(stored_artifacts(&ts.root().join("limited")).is_empty());
    assert_no_staging(ts.root());
    assert!(!store.locks().is_held("limited"));
}

#[tokio::test]
async fn test_cancelled_download_leaves_nothing() {
    let ts = setup().await;
    let owner = ts.gallery_owner().await;
    let store = downloading_store(ts.root());

    let mut partial = PNG.to_vec();
    partial.resize(1000, 0);
    let addr = serve_once("image/png", 100_000, partial).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = store
        .download_to_folder(
            "gallery",
            &owner,
            &format!("http://{addr}/stalled.png"),
            None,
            &cancel,
        )
        .await;

    assert_eq!(result.unwrap_err(), StoreError::Cancelled);
    assert!(stored_artifacts(&ts.root().join("gallery")).is_empty());
    assert_no_staging(ts.root());
    assert!(!store.locks().is_held("gallery"));

    let listing = store.list("gallery", &owner, &no_cancel()).await.unwrap();
    assert!(listing.files.is_empty());
}

#[tokio::test]
async fn test_ensure_root() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = Store::new(dir.path().join("storage"));

    assert!(store.ensure_root().await.unwrap());
    assert!(!store.ensure_root().await.unwrap());
    assert!(dir.path().join("storage/.config").exists());

    // The provisioned root is public and read-only.
    let listing = store
        .list("", &CapabilityToken::new(), &no_cancel())
        .await
        .unwrap();
    assert!(listing.files.is_empty());
    let result = store.authenticate("", AccessKind::Write, "").await;
    assert_eq!(result.unwrap_err(), StoreError::WrongPassword);
}

#[tokio::test]
async fn test_init_folder_twice() {
    let ts = setup().await;

    let result = ts
        .store
        .init_folder("gallery", FolderConfig::public())
        .await;
    assert_eq!(result.unwrap_err(), StoreError::FileAlreadyExists);

    // An inheriting folder can get its own config.
    let folder = ts
        .store
        .init_folder("gallery/sub", FolderConfig::public())
        .await
        .unwrap();
    assert!(folder.owns_config());
    let listing = ts
        .store
        .list("gallery/sub", &CapabilityToken::new(), &no_cancel())
        .await
        .unwrap();
    assert_eq!(listing.config_root_path, "gallery/sub");
}
