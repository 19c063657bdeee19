// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use crate::{
    CachedPages, Dataset, DatasetConfig, DurableStore, Host, IntentLog, IoStats, NoCachedPages,
    NoQuota, PagePinner, QuotaTracker, Result,
};

/// Collects the collaborators and settings of a [`Dataset`].
///
/// Without further configuration the dataset has no intent log, enforces no quota, assumes no
/// memory-mapped pages and uses [`DatasetConfig::default()`].
#[derive(Debug)]
pub struct DatasetBuilder {
    host: Arc<dyn Host>,
    store: Arc<dyn DurableStore>,
    log: Option<Arc<dyn IntentLog>>,
    quota: Arc<dyn QuotaTracker>,
    cache: Arc<dyn CachedPages>,
    config: DatasetConfig,
}

impl DatasetBuilder {
    pub(crate) fn new(host: Arc<dyn Host>, store: Arc<dyn DurableStore>) -> Self {
        Self {
            host,
            store,
            log: None,
            quota: Arc::new(NoQuota),
            cache: Arc::new(NoCachedPages),
            config: DatasetConfig::default(),
        }
    }

    /// Records writes in `log`.
    #[must_use]
    pub fn with_intent_log(mut self, log: Arc<dyn IntentLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Enforces block quotas tracked by `quota`.
    #[must_use]
    pub fn with_quota(mut self, quota: Arc<dyn QuotaTracker>) -> Self {
        self.quota = quota;
        self
    }

    /// Keeps reads and writes coherent with the memory-mapped pages in `cache`.
    #[must_use]
    pub fn with_cached_pages(mut self, cache: Arc<dyn CachedPages>) -> Self {
        self.cache = cache;
        self
    }

    /// Uses `config` instead of the default settings.
    #[must_use]
    pub fn with_config(mut self, config: DatasetConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the dataset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`][crate::Error::InvalidConfig] if the settings are not
    /// usable.
    pub fn build(self) -> Result<Dataset> {
        self.config.validate()?;

        Ok(Dataset {
            pinner: PagePinner::new(Arc::clone(&self.host)),
            host: self.host,
            store: self.store,
            log: self.log,
            quota: self.quota,
            cache: self.cache,
            config: self.config,
            stats: IoStats::default(),
            replay_eof: AtomicU64::new(0),
        })
    }
}
