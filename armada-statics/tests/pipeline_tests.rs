//! End-to-end tests for initialize → push → finalize.

mod common;

use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use armada_core::{AppConfig, AppName, Settings, StaticAssetSpec};
use armada_statics::{push, uses_bucket_sync, Release, StaticsError, StaticsPipeline};
use tempfile::TempDir;

use common::{app, org, provisioner, MemoryConnector, MemoryStore, StubResourceApi, BUCKET};

fn static_spec(guest_path: &str, url_prefix: &str, bucket: Option<&str>) -> StaticAssetSpec {
    StaticAssetSpec {
        guest_path: guest_path.to_string(),
        url_prefix: url_prefix.to_string(),
        bucket: bucket.map(str::to_string),
        index_document: None,
    }
}

fn config(statics: Vec<StaticAssetSpec>) -> AppConfig {
    AppConfig {
        app_name: AppName::from("web"),
        primary_region: "ord".to_string(),
        statics,
        processes: vec![],
    }
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

struct Harness {
    store: Arc<MemoryStore>,
    connector: Arc<MemoryConnector>,
    api: Arc<StubResourceApi>,
    pipeline: StaticsPipeline,
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());
    let api = Arc::new(StubResourceApi::default());
    let pipeline = StaticsPipeline::new(
        provisioner(api.clone()),
        connector.clone(),
        Settings::default(),
    );
    Harness {
        store,
        connector,
        api,
        pipeline,
    }
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deploy_rewrites_candidates_to_bucket_entries() {
    let h = harness();
    let src = TempDir::new().unwrap();
    write(src.path(), "public/index.html", "<html></html>");
    write(src.path(), "docs/guide/intro.md", "# hi");

    let mut docs = static_spec("docs/", "/docs", None);
    docs.index_document = Some("intro.md".to_string());
    let mut cfg = config(vec![
        static_spec("public", "/", None),
        static_spec("/app/baked", "/baked", None),
        static_spec("assets", "/assets", Some("user-bucket")),
        docs,
    ]);

    let report = h
        .pipeline
        .deploy_statics(&app(), &org(), &mut cfg, Release::new(4, src.path()))
        .await
        .expect("deploy")
        .expect("statics were synced");

    assert_eq!(report.files_uploaded(), 2);
    assert_eq!(
        h.store.keys(),
        vec![
            "fly-statics/web/4/0/index.html",
            "fly-statics/web/4/1/guide/intro.md",
        ]
    );

    assert_eq!(
        cfg.statics,
        vec![
            static_spec("/app/baked", "/baked", None),
            static_spec("assets", "/assets", Some("user-bucket")),
            static_spec("/fly-statics/web/4/0/", "/", Some(BUCKET)),
            StaticAssetSpec {
                guest_path: "/fly-statics/web/4/1/".to_string(),
                url_prefix: "/docs".to_string(),
                bucket: Some(BUCKET.to_string()),
                index_document: Some("intro.md".to_string()),
            },
        ]
    );
}

#[tokio::test]
async fn store_is_connected_through_the_proxy_with_sealed_credential() {
    let h = harness();
    let src = TempDir::new().unwrap();
    write(src.path(), "public/a.txt", "a");
    let mut cfg = config(vec![static_spec("public", "/", None)]);

    let ctx = h
        .pipeline
        .initialize(&app(), &org(), &mut cfg, Release::new(1, src.path()))
        .await
        .expect("initialize");

    let targets = h.connector.targets.lock().unwrap().clone();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].bucket, BUCKET);
    assert_eq!(targets[0].proxy_url, "https://tokenizer.fly.io");
    assert_eq!(targets[0].endpoint, "http://fly.storage.tigris.dev");
    assert_eq!(targets[0].sealed_credential, ctx.sealed_credential);

    assert_eq!(ctx.version_root, "fly-statics/web/1");
    assert_eq!(ctx.original_statics.len(), 1);
    assert!(cfg.statics.is_empty(), "candidates are stripped at initialization");
}

#[tokio::test]
async fn nothing_to_sync_skips_provisioning() {
    let h = harness();
    let src = TempDir::new().unwrap();
    let mut cfg = config(vec![static_spec("/baked", "/", None)]);
    assert!(!uses_bucket_sync(&cfg));

    let result = h
        .pipeline
        .deploy_statics(&app(), &org(), &mut cfg, Release::new(1, src.path()))
        .await
        .expect("deploy");

    assert!(result.is_none());
    assert_eq!(h.api.lists.load(Ordering::SeqCst), 0);
    assert_eq!(cfg.statics.len(), 1);
}

#[tokio::test]
async fn finalize_applies_retention_after_push() {
    let h = harness();
    for v in 1..=4 {
        h.store.seed(&format!("fly-statics/web/{v}/0/index.html"), "old");
    }
    h.store.seed("fly-statics/web/9/0/index.html", "orphan");
    let src = TempDir::new().unwrap();
    write(src.path(), "public/index.html", "new");
    let mut cfg = config(vec![static_spec("public", "/", None)]);

    h.pipeline
        .deploy_statics(&app(), &org(), &mut cfg, Release::new(5, src.path()))
        .await
        .expect("deploy");

    assert_eq!(
        h.store.keys(),
        vec![
            "fly-statics/web/3/0/index.html",
            "fly-statics/web/4/0/index.html",
            "fly-statics/web/5/0/index.html",
        ]
    );
}

// ---------------------------------------------------------------------------
// Failure paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_push_removes_version_directory_and_leaves_config_stripped() {
    let h = harness();
    h.store.seed("fly-statics/web/2/0/index.html", "previous release");
    let src = TempDir::new().unwrap();
    write(src.path(), "public/index.html", "ok");
    let mut cfg = config(vec![
        static_spec("public", "/", None),
        static_spec("missing", "/m", None),
    ]);

    let ctx = h
        .pipeline
        .initialize(&app(), &org(), &mut cfg, Release::new(3, src.path()))
        .await
        .expect("initialize");
    let err = push(&ctx, &mut cfg).await.unwrap_err();

    assert!(matches!(err, StaticsError::Walk { .. }), "got {err:?}");
    assert!(h.store.keys_under("fly-statics/web/3/").is_empty());
    assert_eq!(h.store.keys(), vec!["fly-statics/web/2/0/index.html"]);
    assert!(cfg.statics.is_empty());
}

#[tokio::test]
async fn panicking_upload_is_converted_and_cleaned_up() {
    let h = harness();
    h.store.panic_puts_containing("explode");
    let src = TempDir::new().unwrap();
    write(src.path(), "public/a.txt", "a");
    write(src.path(), "public/explode.txt", "b");
    let mut cfg = config(vec![static_spec("public", "/", None)]);

    let ctx = h
        .pipeline
        .initialize(&app(), &org(), &mut cfg, Release::new(8, src.path()))
        .await
        .expect("initialize");
    let err = push(&ctx, &mut cfg).await.unwrap_err();

    assert!(matches!(err, StaticsError::PushPanicked(_)), "got {err:?}");
    assert!(h.store.keys_under("fly-statics/web/8/").is_empty());
}

#[tokio::test]
async fn first_deploy_creates_the_bucket_once() {
    let h = harness();
    let src = TempDir::new().unwrap();
    write(src.path(), "public/a.txt", "a");

    let mut cfg = config(vec![static_spec("public", "/", None)]);
    h.pipeline
        .deploy_statics(&app(), &org(), &mut cfg, Release::new(1, src.path()))
        .await
        .expect("deploy");

    assert_eq!(h.api.creates.load(Ordering::SeqCst), 1);
}
