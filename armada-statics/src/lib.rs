//! # armada-statics
//!
//! Versioned static-asset synchronization to object storage.
//!
//! [`StaticsPipeline`] provisions the bucket and connects a store client;
//! [`push`] uploads every candidate static with [`AssetSynchronizer`];
//! [`finalize`] runs [`RetentionManager`]. A failed push is cleaned up by
//! [`cleanup_after_failure`].

pub mod content_type;
pub mod error;
pub mod paths;
pub mod pipeline;
pub mod recovery;
pub mod retention;
pub mod store;
pub mod sync;

pub use error::{StaticsError, StoreError};
pub use pipeline::{
    finalize, push, uses_bucket_sync, PushReport, Release, StaticsContext, StaticsPipeline,
};
pub use recovery::{cleanup_after_failure, CleanupOutcome};
pub use retention::{RetentionManager, RetentionReport};
pub use store::{
    BucketHandle, ListPage, ObjectInfo, ObjectStore, ObjectStoreConnector, StoreTarget,
    MAX_DELETE_BATCH,
};
pub use sync::{AssetSynchronizer, UploadSummary};
