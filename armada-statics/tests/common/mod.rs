//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use armada_core::{AppIdentity, AppName, OrgIdentity, Settings};
use armada_provision::{
    BucketProvisioner, CreateResourceRequest, CreatedResource, ManagedResource, ResourceApi,
    ResourceError,
};
use armada_statics::{
    AssetSynchronizer, BucketHandle, ListPage, ObjectInfo, ObjectStore, ObjectStoreConnector,
    StoreError, StoreTarget,
};
use async_trait::async_trait;
use serde_json::Value;

pub const BUCKET: &str = "web-statics";

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    fail_puts_containing: Mutex<Option<String>>,
    panic_puts_containing: Mutex<Option<String>>,
    put_delay: Mutex<Option<Duration>>,
    list_delay: Mutex<Option<Duration>>,
    fail_lists: AtomicBool,
    put_attempts: AtomicUsize,
    delete_batches: Mutex<Vec<usize>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, key: &str, body: &str) {
        self.objects.lock().unwrap().insert(
            (BUCKET.to_string(), key.to_string()),
            StoredObject {
                body: body.as_bytes().to_vec(),
                content_type: "text/plain".to_string(),
            },
        );
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(bucket, _)| bucket == BUCKET)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn keys_under(&self, prefix: &str) -> Vec<String> {
        self.keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(BUCKET.to_string(), key.to_string()))
            .cloned()
    }

    pub fn fail_puts_containing(&self, needle: &str) {
        *self.fail_puts_containing.lock().unwrap() = Some(needle.to_string());
    }

    pub fn panic_puts_containing(&self, needle: &str) {
        *self.panic_puts_containing.lock().unwrap() = Some(needle.to_string());
    }

    pub fn set_put_delay(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_lists(&self) {
        self.fail_lists.store(true, Ordering::SeqCst);
    }

    pub fn put_attempts(&self) -> usize {
        self.put_attempts.load(Ordering::SeqCst)
    }

    pub fn delete_batches(&self) -> Vec<usize> {
        self.delete_batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);

        let panic_needle = self.panic_puts_containing.lock().unwrap().clone();
        if panic_needle.is_some_and(|n| key.contains(&n)) {
            panic!("simulated store panic for {key}");
        }
        let fail_needle = self.fail_puts_containing.lock().unwrap().clone();
        if fail_needle.is_some_and(|n| key.contains(&n)) {
            return Err(StoreError::Put {
                key: key.to_string(),
                message: "simulated failure".to_string(),
            });
        }

        let delay = *self.put_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(StoreError::List {
                prefix: prefix.to_string(),
                message: "simulated failure".to_string(),
            });
        }

        let objects = self.objects.lock().unwrap();
        let mut page = ListPage::default();
        let mut prefixes = BTreeSet::new();
        for ((b, key), object) in objects.iter() {
            if b != bucket || !key.starts_with(prefix) {
                continue;
            }
            let rest = &key[prefix.len()..];
            match delimiter.and_then(|d| rest.find(d).map(|i| i + d.len())) {
                Some(end) => {
                    prefixes.insert(format!("{prefix}{}", &rest[..end]));
                }
                None => page.objects.push(ObjectInfo {
                    key: key.clone(),
                    size: object.body.len() as u64,
                }),
            }
        }
        page.common_prefixes = prefixes.into_iter().collect();
        Ok(page)
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StoreError> {
        if keys.len() > armada_statics::MAX_DELETE_BATCH {
            return Err(StoreError::BatchTooLarge(keys.len()));
        }
        self.delete_batches.lock().unwrap().push(keys.len());
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(&(bucket.to_string(), key.clone()));
        }
        Ok(())
    }
}

pub fn synchronizer(store: &Arc<MemoryStore>, workers: usize) -> AssetSynchronizer {
    AssetSynchronizer::new(BucketHandle::new(store.clone(), BUCKET), workers)
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

pub struct MemoryConnector {
    pub store: Arc<MemoryStore>,
    pub targets: Mutex<Vec<StoreTarget>>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            targets: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ObjectStoreConnector for MemoryConnector {
    async fn connect(&self, target: &StoreTarget) -> Result<Arc<dyn ObjectStore>, StoreError> {
        self.targets.lock().unwrap().push(target.clone());
        Ok(self.store.clone())
    }
}

// ---------------------------------------------------------------------------
// Resource API
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StubResourceApi {
    pub creates: AtomicUsize,
    pub lists: AtomicUsize,
}

#[async_trait]
impl ResourceApi for StubResourceApi {
    async fn list_resources(&self, _provider: &str) -> Result<Vec<ManagedResource>, ResourceError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn create_resource(
        &self,
        request: &CreateResourceRequest,
    ) -> Result<CreatedResource, ResourceError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(CreatedResource {
            id: "res-1".to_string(),
            name: request.name.clone(),
            environment: BTreeMap::from([
                ("AWS_ACCESS_KEY_ID".to_string(), "tid".to_string()),
                ("AWS_SECRET_ACCESS_KEY".to_string(), "tsec".to_string()),
            ]),
        })
    }

    async fn update_metadata(&self, _resource_id: &str, _metadata: &Value) -> Result<(), ResourceError> {
        Ok(())
    }

    async fn delete_resource(&self, _name: &str) -> Result<(), ResourceError> {
        Ok(())
    }
}

pub fn provisioner(api: Arc<StubResourceApi>) -> BucketProvisioner {
    BucketProvisioner::from_settings(api, &Settings::default()).expect("provisioner")
}

pub fn app() -> AppIdentity {
    AppIdentity {
        id: "app_web".to_string(),
        name: AppName::from("web"),
        internal_numeric_id: 7,
    }
}

pub fn org() -> OrgIdentity {
    OrgIdentity {
        slug: "acme".to_string(),
        internal_numeric_id: "11".to_string(),
    }
}
