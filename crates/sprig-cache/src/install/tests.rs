use super::*;
use crate::archive::archive_from_entries;
use sprig_core::types::Version;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::{tempdir, TempDir};

#[derive(Debug)]
struct TestSource {
    id: PackageId,
    archive: Vec<u8>,
    local_path: Option<PathBuf>,
    fail: bool,
    fetches: AtomicUsize,
}

impl TestSource {
    fn new(name: &str, version: Version, archive: Vec<u8>) -> Self {
        Self {
            id: PackageId::new(name, version),
            archive,
            local_path: None,
            fail: false,
            fetches: AtomicUsize::new(0),
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for TestSource {
    fn package_id(&self) -> &PackageId {
        &self.id
    }

    fn is_http(&self) -> bool {
        self.local_path.is_none()
    }

    fn local_path(&self) -> Option<PathBuf> {
        self.local_path.clone()
    }

    async fn fetch_content(&self) -> SprigResult<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SprigError::Network {
                message: format!("connection reset while downloading {}", self.id),
                source: None,
            });
        }
        Ok(self.archive.clone())
    }
}

fn package_archive(spec_file: &str, id: &str, version: &str) -> Vec<u8> {
    let spec = format!(
        r#"{{"id":"{}","version":"{}","description":"test package","dependencies":{{}}}}"#,
        id, version
    );
    archive_from_entries(&[
        (spec_file, spec.as_bytes()),
        ("lib/content.txt", b"payload".as_slice()),
    ])
    .unwrap()
}

fn installer(dir: &TempDir) -> PackageInstaller {
    let root = Utf8PathBuf::from_path_buf(dir.path().join("packages")).unwrap();
    PackageInstaller::new(PackagePathResolver::new(root), 4)
}

fn accept_all(_: &PackageId, _: &str) -> bool {
    true
}

#[tokio::test]
async fn test_install_materializes_record() {
    let dir = tempdir().unwrap();
    let installer = installer(&dir);
    let archive = package_archive("Json.pkgspec", "Json", "1.5.0");
    let expected_hash = sha512_base64(&archive);
    let source = Arc::new(TestSource::new("Json", Version::new(1, 5, 0), archive.clone()));

    let report = installer.install(vec![source.clone()], accept_all).await;

    assert!(report.is_success(), "{:?}", report.failed);
    assert_eq!(report.installed, vec![source.id.clone()]);

    let layout = installer.layout();
    assert_eq!(layout.read_hash(&source.id).await.unwrap(), Some(expected_hash));
    assert_eq!(std::fs::read(layout.archive_path(&source.id)).unwrap(), archive);
    assert!(layout.spec_path(&source.id).exists());
    assert_eq!(
        std::fs::read_to_string(layout.install_path(&source.id).join("lib/content.txt")).unwrap(),
        "payload"
    );
}

#[tokio::test]
async fn test_install_is_idempotent() {
    let dir = tempdir().unwrap();
    let installer = installer(&dir);
    let source = Arc::new(TestSource::new(
        "Json",
        Version::new(1, 0, 0),
        package_archive("Json.pkgspec", "Json", "1.0.0"),
    ));

    let first = installer.install(vec![source.clone()], accept_all).await;
    assert_eq!(first.installed.len(), 1);

    let second = installer.install(vec![source.clone()], accept_all).await;
    assert!(second.installed.is_empty());
    assert_eq!(second.skipped, vec![source.id.clone()]);
    assert_eq!(source.fetches(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_installs_extract_once() {
    let dir = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("packages")).unwrap();
    let source = Arc::new(TestSource::new(
        "Json",
        Version::new(2, 0, 0),
        package_archive("Json.pkgspec", "Json", "2.0.0"),
    ));

    // Separate installers stand in for separate restores sharing one cache
    let mut handles = Vec::new();
    for _ in 0..8 {
        let installer = PackageInstaller::new(PackagePathResolver::new(root.clone()), 2);
        let source = source.clone();
        handles.push(tokio::spawn(async move {
            let report = installer.install(vec![source.clone()], accept_all).await;
            let complete = installer.layout().is_installed(&source.id).await
                && installer.layout().spec_path(&source.id).exists();
            (report, complete)
        }));
    }

    let mut installed = 0;
    for handle in handles {
        let (report, complete) = handle.await.unwrap();
        assert!(report.is_success(), "{:?}", report.failed);
        assert!(complete);
        installed += report.installed.len();
    }
    assert_eq!(installed, 1);
}

#[tokio::test]
async fn test_rejected_hash_leaves_no_record() {
    let dir = tempdir().unwrap();
    let installer = installer(&dir);
    let source = Arc::new(TestSource::new(
        "Json",
        Version::new(1, 0, 0),
        package_archive("Json.pkgspec", "Json", "1.0.0"),
    ));

    let pinned = "not-the-real-hash".to_string();
    let report = installer
        .install(vec![source.clone()], move |_, hash| hash == pinned)
        .await;

    assert!(report.is_success());
    assert_eq!(report.rejected, vec![source.id.clone()]);
    assert!(!installer.layout().install_path(&source.id).exists());
}

#[tokio::test]
async fn test_spec_casing_is_fixed() {
    let dir = tempdir().unwrap();
    let installer = installer(&dir);
    let source = Arc::new(TestSource::new(
        "Json",
        Version::new(1, 0, 0),
        package_archive("json.pkgspec", "json", "1.0.0"),
    ));

    let report = installer.install(vec![source.clone()], accept_all).await;
    assert!(report.is_success(), "{:?}", report.failed);

    let record = installer.layout().install_path(&source.id);
    let specs: Vec<String> = std::fs::read_dir(&record)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".pkgspec"))
        .collect();
    assert_eq!(specs, vec!["Json.pkgspec".to_string()]);

    let spec = PackageSpec::parse(
        &std::fs::read(installer.layout().spec_path(&source.id)).unwrap(),
        "Json.pkgspec",
    )
    .unwrap();
    assert_eq!(spec.id, "Json");
    assert_eq!(spec.extra.get("description").unwrap(), "test package");
}

#[tokio::test]
async fn test_foreign_spec_is_refused() {
    let dir = tempdir().unwrap();
    let installer = installer(&dir);
    let source = Arc::new(TestSource::new(
        "Json",
        Version::new(1, 0, 0),
        package_archive("Other.pkgspec", "Other", "1.0.0"),
    ));

    let report = installer.install(vec![source.clone()], accept_all).await;
    assert_eq!(report.failed.len(), 1);
    assert!(!installer.layout().install_path(&source.id).exists());
}

#[tokio::test]
async fn test_failed_fetch_only_affects_its_item() {
    let dir = tempdir().unwrap();
    let installer = installer(&dir);
    let good = Arc::new(TestSource::new(
        "Json",
        Version::new(1, 0, 0),
        package_archive("Json.pkgspec", "Json", "1.0.0"),
    ));
    let mut broken = TestSource::new("Http", Version::new(3, 1, 0), Vec::new());
    broken.fail = true;
    let broken = Arc::new(broken);

    let report = installer
        .install(vec![good.clone(), broken.clone()], accept_all)
        .await;

    assert!(!report.is_success());
    assert_eq!(report.installed, vec![good.id.clone()]);
    match &report.failed[..] {
        [RestoreDiagnostic::InstallFailed { package, message }] => {
            assert_eq!(package, &broken.id);
            assert!(message.contains("connection reset"), "{}", message);
        },
        other => panic!("unexpected failures: {other:?}"),
    }
    assert!(!installer.layout().package_root("Http").join("3.1.0").exists());
    assert!(installer.layout().is_installed(&good.id).await);
}

#[tokio::test]
async fn test_corrupt_archive_cleans_staging() {
    let dir = tempdir().unwrap();
    let installer = installer(&dir);
    let source = Arc::new(TestSource::new(
        "Json",
        Version::new(1, 0, 0),
        b"this is not an archive".to_vec(),
    ));

    let report = installer.install(vec![source.clone()], accept_all).await;
    assert_eq!(report.failed.len(), 1);

    let leftovers: Vec<_> = std::fs::read_dir(installer.layout().package_root("Json"))
        .unwrap()
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}

#[tokio::test]
async fn test_unfinished_record_is_replaced() {
    let dir = tempdir().unwrap();
    let installer = installer(&dir);
    let source = Arc::new(TestSource::new(
        "Json",
        Version::new(1, 0, 0),
        package_archive("Json.pkgspec", "Json", "1.0.0"),
    ));

    let target = installer.layout().install_path(&source.id);
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("half-written.txt"), "junk").unwrap();

    let report = installer.install(vec![source.clone()], accept_all).await;
    assert_eq!(report.installed.len(), 1);
    assert!(!target.join("half-written.txt").exists());
    assert!(installer.layout().is_installed(&source.id).await);
}

#[tokio::test]
async fn test_filesystem_source_copies_archive() {
    let dir = tempdir().unwrap();
    let installer = installer(&dir);
    let archive = package_archive("Json.pkgspec", "Json", "1.0.0");
    let feed_file = dir.path().join("Json.1.0.0.pkg");
    std::fs::write(&feed_file, &archive).unwrap();

    let mut source = TestSource::new("Json", Version::new(1, 0, 0), archive.clone());
    source.local_path = Some(feed_file);
    let source = Arc::new(source);

    let report = installer.install(vec![source.clone()], accept_all).await;
    assert!(report.is_success(), "{:?}", report.failed);
    assert_eq!(
        std::fs::read(installer.layout().archive_path(&source.id)).unwrap(),
        archive
    );
}
