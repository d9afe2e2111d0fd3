use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use crate::core::error::{Error, Result};
use crate::fs::overlay::SubFileSystem;
use crate::fs::{clean_path, FileSystem};
use crate::page::format::{format_of, FormatProvider};
use crate::page::language::{is_language_tag, normalize_tag};
use crate::page::stub::{identity, Stub};
use crate::page::{normalize_url, Page};

/// Receives every page the cache indexes and every stub it drops.
pub trait PageIndexer: Send + Sync {
    fn name(&self) -> &str;

    fn add_page(&self, stub: &Stub, page: &Page) -> Result<()>;

    fn remove_page(&self, stub: &Stub) -> Result<()>;
}

/// A filesystem attached under a named root.
#[derive(Clone)]
pub struct Mount {
    pub point: String,
    pub fs: Arc<dyn FileSystem>,
}

impl Mount {
    pub fn new(point: &str, fs: Arc<dyn FileSystem>) -> Self {
        Mount { point: normalize_url(point), fs }
    }
}

#[derive(Debug)]
pub struct RebuildError {
    pub mount: String,
    pub path: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct RebuildReport {
    pub files: usize,
    pub indexed: usize,
    pub removed: usize,
    pub errors: Vec<RebuildError>,
}

impl RebuildReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Default)]
struct LanguageTree {
    paths: BTreeMap<String, Stub>,
    urls: BTreeMap<String, Stub>,
}

#[derive(Default)]
struct CacheState {
    trees: HashMap<String, HashMap<String, LanguageTree>>,
    stubs: BTreeMap<String, Stub>,
    redirects: HashMap<String, Stub>,
    translations: HashMap<String, Vec<Stub>>,
}

/// One language-scoped view of a mount.
struct Scope {
    language: String,
    fs: Arc<dyn FileSystem>,
    excluded_dirs: Vec<String>,
}

/// Mount → language → path/URL index over every page stub.
///
/// `rebuild` holds the write lock for its whole run, so readers never see a
/// half-built cache; they wait instead.
pub struct PageCache {
    mounts: Vec<Mount>,
    formats: Arc<FormatProvider>,
    default_language: String,
    indexers: Vec<Arc<dyn PageIndexer>>,
    state: RwLock<CacheState>,
}

impl PageCache {
    pub fn new(formats: Arc<FormatProvider>, default_language: &str) -> Self {
        PageCache {
            mounts: Vec::new(),
            formats,
            default_language: normalize_tag(default_language),
            indexers: Vec::new(),
            state: RwLock::new(CacheState::default()),
        }
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn PageIndexer>) -> Self {
        self.indexers.push(indexer);
        self
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    pub fn formats(&self) -> &Arc<FormatProvider> {
        &self.formats
    }

    /// Rebuilds the whole cache from the mounted filesystems.
    ///
    /// Per-file failures (including failures of attached indexers) are
    /// collected in the report; the rebuild carries on and what it already
    /// applied stays applied.
    pub fn rebuild(&self) -> RebuildReport {
        let started = Instant::now();
        let mut state = self.state.write();
        let previous = std::mem::take(&mut state.stubs);
        state.trees.clear();
        state.redirects.clear();
        state.translations.clear();

        let mut report = RebuildReport::default();
        for mount in &self.mounts {
            let scopes = match self.scopes(mount) {
                Ok(scopes) => scopes,
                Err(error) => {
                    warn!(mount = %mount.point, error = %error, "cannot list mount");
                    report.errors.push(RebuildError {
                        mount: mount.point.clone(),
                        path: String::new(),
                        error,
                    });
                    continue;
                }
            };
            for scope in scopes {
                self.rebuild_scope(&mut state, &previous, mount, &scope, &mut report);
            }
        }

        for (shasum, stub) in previous {
            if state.stubs.contains_key(&shasum) {
                continue;
            }
            report.removed += 1;
            for indexer in &self.indexers {
                if let Err(error) = indexer.remove_page(&stub) {
                    warn!(indexer = indexer.name(), path = %stub.source, error = %error, "failed to drop stale page");
                    report.errors.push(RebuildError {
                        mount: stub.mount.clone(),
                        path: stub.source.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            files = report.files,
            indexed = report.indexed,
            removed = report.removed,
            errors = report.errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "page cache rebuilt"
        );
        report
    }

    fn scopes(&self, mount: &Mount) -> Result<Vec<Scope>> {
        let locales: Vec<String> = mount
            .fs
            .list_dirs()?
            .into_iter()
            .filter(|dir| is_language_tag(dir))
            .collect();

        let mut scopes = vec![Scope {
            language: self.default_language.clone(),
            fs: mount.fs.clone(),
            excluded_dirs: locales.clone(),
        }];
        for dir in locales {
            let overlay: Arc<dyn FileSystem> = Arc::new(SubFileSystem::new(mount.fs.clone(), &dir));
            scopes.push(Scope {
                language: normalize_tag(&dir),
                fs: overlay,
                excluded_dirs: Vec::new(),
            });
        }
        Ok(scopes)
    }

    fn rebuild_scope(
        &self,
        state: &mut CacheState,
        previous: &BTreeMap<String, Stub>,
        mount: &Mount,
        scope: &Scope,
        report: &mut RebuildReport,
    ) {
        let files = match scope.fs.list_all_files() {
            Ok(files) => files,
            Err(error) => {
                report.errors.push(RebuildError {
                    mount: mount.point.clone(),
                    path: scope.fs.name().to_string(),
                    error,
                });
                return;
            }
        };
        let files: Vec<String> = files
            .into_iter()
            .filter(|path| {
                !scope
                    .excluded_dirs
                    .iter()
                    .any(|dir| path.strip_prefix(dir.as_str()).is_some_and(|rest| rest.starts_with('/')))
            })
            .filter(|path| {
                let known = self.formats.knows(&format_of(path));
                if !known {
                    debug!(path = %path, "no indexer for format, skipped");
                }
                known
            })
            .collect();
        report.files += files.len();

        // hashing dominates a rebuild and needs no shared state
        let hashed: Vec<(String, Result<String>)> = files
            .into_par_iter()
            .map(|path| {
                let sum = scope.fs.shasum(&path);
                (path, sum)
            })
            .collect();

        for (path, sum) in hashed {
            let made = sum.and_then(|content| {
                let id = identity(&mount.point, &scope.language, &path, &content);
                let stub = match previous.get(&id) {
                    Some(stub) => stub.clone(),
                    None => Stub::new(
                        id,
                        path.as_str(),
                        mount.point.as_str(),
                        scope.language.as_str(),
                        self.default_language.as_str(),
                        scope.fs.clone(),
                    ),
                };
                let page = stub.make(&self.formats)?;
                Ok((stub, page))
            });
            match made {
                Ok((stub, page)) => self.register(state, stub, &page, report),
                Err(error) => {
                    warn!(mount = %mount.point, path = %path, error = %error, "failed to index file");
                    report.errors.push(RebuildError {
                        mount: mount.point.clone(),
                        path,
                        error,
                    });
                }
            }
        }
    }

    fn register(&self, state: &mut CacheState, stub: Stub, page: &Page, report: &mut RebuildReport) {
        let tree = state
            .trees
            .entry(stub.mount.clone())
            .or_default()
            .entry(stub.language.clone())
            .or_default();
        tree.paths.insert(stub.source.clone(), stub.clone());
        if let Some(other) = tree.urls.insert(page.url.clone(), stub.clone()) {
            if other.shasum != stub.shasum {
                debug!(url = %page.url, shadowed = %other.source, "url registered twice");
            }
        }
        if let Some(permalink) = &page.permalink {
            tree.urls.insert(permalink.clone(), stub.clone());
        }
        for redirect in &page.redirects {
            state.redirects.insert(redirect.clone(), stub.clone());
        }
        if let Some(source) = &page.translates {
            state.translations.entry(source.clone()).or_default().push(stub.clone());
        }
        state.stubs.insert(stub.shasum.clone(), stub.clone());

        let mut ok = true;
        for indexer in &self.indexers {
            if let Err(error) = indexer.add_page(&stub, page) {
                ok = false;
                warn!(indexer = indexer.name(), path = %stub.source, error = %error, "indexer rejected page");
                report.errors.push(RebuildError {
                    mount: stub.mount.clone(),
                    path: stub.source.clone(),
                    error,
                });
            }
        }
        if ok {
            report.indexed += 1;
        }
    }

    /// Page at `url` (or source path) in `language`, falling back to the
    /// default language.
    pub fn lookup(&self, language: &str, url: &str) -> Option<Stub> {
        let state = self.state.read();
        let language = normalize_tag(language);
        let url_key = normalize_url(url);
        let path_key = clean_path(url);

        let mut languages = vec![language.as_str()];
        if language != self.default_language {
            languages.push(self.default_language.as_str());
        }
        for lang in languages {
            for mount in &self.mounts {
                let Some(tree) = state.trees.get(&mount.point).and_then(|langs| langs.get(lang)) else {
                    continue;
                };
                if let Some(stub) = tree.urls.get(&url_key).or_else(|| tree.paths.get(&path_key)) {
                    return Some(stub.clone());
                }
            }
        }
        None
    }

    /// Pages in `language` at `prefix` or below it, ordered by URL.
    pub fn lookup_prefix(&self, language: &str, prefix: &str) -> Vec<Stub> {
        let state = self.state.read();
        let language = normalize_tag(language);
        let prefix = normalize_url(prefix);
        let nested = if prefix == "/" { prefix.clone() } else { format!("{}/", prefix) };

        let mut seen = HashSet::new();
        let mut found: Vec<(String, Stub)> = Vec::new();
        for mount in &self.mounts {
            let Some(tree) = state.trees.get(&mount.point).and_then(|langs| langs.get(&language)) else {
                continue;
            };
            for (url, stub) in &tree.urls {
                if (*url == prefix || url.starts_with(&nested)) && seen.insert(stub.shasum.clone()) {
                    found.push((url.clone(), stub.clone()));
                }
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found.into_iter().map(|(_, stub)| stub).collect()
    }

    pub fn lookup_redirect(&self, url: &str) -> Option<Stub> {
        self.state.read().redirects.get(&normalize_url(url)).cloned()
    }

    pub fn lookup_translations(&self, url: &str) -> Vec<Stub> {
        self.state
            .read()
            .translations
            .get(&normalize_url(url))
            .cloned()
            .unwrap_or_default()
    }

    pub fn stub(&self, shasum: &str) -> Option<Stub> {
        self.state.read().stubs.get(shasum).cloned()
    }

    /// Stubs for `shasums`, in the given order, skipping unknown ones.
    pub fn resolve(&self, shasums: &[String]) -> Vec<Stub> {
        let state = self.state.read();
        shasums.iter().filter_map(|s| state.stubs.get(s).cloned()).collect()
    }

    pub fn stubs(&self) -> Vec<Stub> {
        self.state.read().stubs.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().stubs.is_empty()
    }
}
