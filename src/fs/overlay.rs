use std::sync::Arc;
use chrono::{DateTime, Utc};
use crate::core::error::Result;
use crate::fs::{clean_path, FileSystem};

/// View of one subdirectory of another filesystem, rooted at that
/// subdirectory. Locale directories (`fr/`, `pt-BR/`) are served this way.
pub struct SubFileSystem {
    inner: Arc<dyn FileSystem>,
    prefix: String,
    name: String,
}

impl SubFileSystem {
    pub fn new(inner: Arc<dyn FileSystem>, dir: &str) -> Self {
        let prefix = clean_path(dir);
        let name = format!("{}/{}", inner.name(), prefix);
        SubFileSystem { inner, prefix, name }
    }

    fn full(&self, path: &str) -> String {
        format!("{}/{}", self.prefix, clean_path(path))
    }
}

impl FileSystem for SubFileSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_all_files(&self) -> Result<Vec<String>> {
        let scope = format!("{}/", self.prefix);
        Ok(self
            .inner
            .list_all_files()?
            .into_iter()
            .filter_map(|path| path.strip_prefix(&scope).map(str::to_string))
            .collect())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.read_file(&self.full(path))
    }

    fn shasum(&self, path: &str) -> Result<String> {
        self.inner.shasum(&self.full(path))
    }

    fn file_created(&self, path: &str) -> Result<DateTime<Utc>> {
        self.inner.file_created(&self.full(path))
    }

    fn last_modified(&self, path: &str) -> Result<DateTime<Utc>> {
        self.inner.last_modified(&self.full(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::memory::MemoryFileSystem;

    #[test]
    fn test_scoped_view() {
        let fs = Arc::new(MemoryFileSystem::new("site"));
        fs.insert("index.md", "en");
        fs.insert("fr/index.md", "fr");
        fs.insert("fr/blog/post.md", "billet");
        fs.insert("fresh/x.md", "not french");

        let fr = SubFileSystem::new(fs, "fr");
        assert_eq!(fr.list_all_files().unwrap(), vec!["blog/post.md", "index.md"]);
        assert_eq!(fr.read_file("index.md").unwrap(), b"fr".to_vec());
        assert_eq!(fr.list_dirs().unwrap(), vec!["blog"]);
        assert_eq!(fr.name(), "site/fr");
    }
}
