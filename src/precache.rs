//! Offline rebuild of a persistent index.
//!
//! Every provider is started and drained through the engine's index hooks.
//! The store is flushed and compacted once before the providers shut down.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use crate::core::config::Config;
use crate::core::engine::IndexEngine;
use crate::core::error::Result;
use crate::page::{FormatProvider, Mount, PageCache, PageIndexer, RebuildReport};

/// A source of pages with a lifecycle around the drain.
pub trait PageProvider: Send + Sync {
    fn name(&self) -> &str;

    fn startup(&self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// Pushes every page through `indexer`.
    fn provide(&self, indexer: Arc<dyn PageIndexer>) -> Result<RebuildReport>;
}

/// Serves the pages of a set of mounted filesystems.
pub struct MountProvider {
    name: String,
    mounts: Vec<Mount>,
    formats: Arc<FormatProvider>,
    default_language: String,
}

impl MountProvider {
    pub fn new(name: &str, formats: Arc<FormatProvider>, default_language: &str) -> Self {
        MountProvider {
            name: name.to_string(),
            mounts: Vec::new(),
            formats,
            default_language: default_language.to_string(),
        }
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }
}

impl PageProvider for MountProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn startup(&self) -> Result<()> {
        if self.mounts.is_empty() {
            warn!(provider = %self.name, "provider has no mounts");
        }
        Ok(())
    }

    fn provide(&self, indexer: Arc<dyn PageIndexer>) -> Result<RebuildReport> {
        let cache = self
            .mounts
            .iter()
            .cloned()
            .fold(PageCache::new(self.formats.clone(), &self.default_language), PageCache::with_mount)
            .with_indexer(indexer);
        Ok(cache.rebuild())
    }
}

#[derive(Debug, Default)]
pub struct PrecacheReport {
    pub providers: usize,
    pub files: usize,
    pub indexed: usize,
    pub failed: usize,
    pub keywords: usize,
    pub attributes: usize,
    pub elapsed: Duration,
}

impl PrecacheReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Rebuilds the index described by `config` from `providers`.
///
/// The store is opened writable and durable whatever `config` says. Per-page
/// failures are counted, not fatal; a provider failing to start or drain
/// aborts the run after the started providers are shut down.
pub fn run(config: Config, providers: &[Arc<dyn PageProvider>]) -> Result<PrecacheReport> {
    let started = Instant::now();
    let config = Config {
        read_only: false,
        durable: true,
        ..config
    };
    let engine = Arc::new(IndexEngine::open(config)?);
    info!(backend = engine.store().name(), providers = providers.len(), "precache started");

    let mut report = PrecacheReport::default();
    let mut running: Vec<&Arc<dyn PageProvider>> = Vec::new();
    let drained = (|| -> Result<()> {
        for provider in providers {
            provider.startup()?;
            running.push(provider);
        }
        // a full rebuild: stubs of pages deleted since the last run must not survive
        engine.clear()?;
        for provider in providers {
            let rebuilt = provider.provide(engine.clone())?;
            for failure in &rebuilt.errors {
                warn!(provider = provider.name(), path = %failure.path, error = %failure.error, "page not indexed");
            }
            report.files += rebuilt.files;
            report.indexed += rebuilt.indexed;
            report.failed += rebuilt.errors.len();
            report.providers += 1;
        }
        Ok(())
    })();

    let persisted = drained.and_then(|()| {
        engine.flush()?;
        engine.compact()
    });

    for provider in running.into_iter().rev() {
        if let Err(err) = provider.shutdown() {
            warn!(provider = provider.name(), error = %err, "provider shutdown failed");
        }
    }
    persisted?;

    report.keywords = engine.known_keywords()?.len();
    report.attributes = engine.context().keys()?.len();
    report.elapsed = started.elapsed();
    info!(
        files = report.files,
        indexed = report.indexed,
        failed = report.failed,
        keywords = report.keywords,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "precache finished"
    );
    Ok(report)
}
