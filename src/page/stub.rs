use std::fmt;
use std::sync::Arc;
use sha2::{Digest, Sha256};
use crate::core::error::{Error, ErrorKind, Result};
use crate::fs::FileSystem;
use crate::page::format::{format_of, FormatProvider};
use crate::page::Page;

/// Identity record for one page revision.
///
/// Cheap to clone; the full page is only materialised by [`Stub::make`].
#[derive(Clone)]
pub struct Stub {
    pub shasum: String,
    pub source: String,
    pub mount: String,
    pub language: String,
    pub fallback: String,
    fs: Arc<dyn FileSystem>,
}

impl Stub {
    pub fn new(
        shasum: impl Into<String>,
        source: impl Into<String>,
        mount: impl Into<String>,
        language: impl Into<String>,
        fallback: impl Into<String>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Stub {
            shasum: shasum.into(),
            source: source.into(),
            mount: mount.into(),
            language: language.into(),
            fallback: fallback.into(),
            fs,
        }
    }

    /// Hashes the file at `source` and derives the stub identity from the
    /// content hash and where the file lives. Same bytes at the same place
    /// always give the same identity.
    pub fn from_file(
        fs: Arc<dyn FileSystem>,
        source: &str,
        mount: &str,
        language: &str,
        fallback: &str,
    ) -> Result<Self> {
        let content = fs.shasum(source)?;
        Ok(Self::new(identity(mount, language, source, &content), source, mount, language, fallback, fs))
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn format(&self) -> String {
        format_of(&self.source)
    }

    /// Re-reads the file and resolves the full page.
    pub fn make(&self, formats: &FormatProvider) -> Result<Page> {
        let bytes = self.fs.read_file(&self.source)?;
        let raw = String::from_utf8(bytes).map_err(|_| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("{}: {} is not valid UTF-8", self.fs.name(), self.source),
            )
        })?;
        let created = self.fs.file_created(&self.source)?;
        let modified = self.fs.last_modified(&self.source)?;
        let indexer = formats.indexer(&self.format());
        Page::assemble(self, &raw, created, modified, indexer.as_deref())
    }
}

pub fn identity(mount: &str, language: &str, source: &str, content_shasum: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [mount, language, source, content_shasum] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

impl fmt::Debug for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("shasum", &self.shasum)
            .field("source", &self.source)
            .field("mount", &self.mount)
            .field("language", &self.language)
            .field("fallback", &self.fallback)
            .field("fs", &self.fs.name())
            .finish()
    }
}

impl PartialEq for Stub {
    fn eq(&self, other: &Self) -> bool {
        self.shasum == other.shasum
    }
}

impl Eq for Stub {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::memory::MemoryFileSystem;

    #[test]
    fn test_identity_is_stable_per_location() {
        let fs = Arc::new(MemoryFileSystem::new("site"));
        fs.insert("a.md", "same");
        fs.insert("b.md", "same");
        let a1 = Stub::from_file(fs.clone(), "a.md", "/", "en", "en").unwrap();
        let a2 = Stub::from_file(fs.clone(), "a.md", "/", "en", "en").unwrap();
        let b = Stub::from_file(fs.clone(), "b.md", "/", "en", "en").unwrap();
        let a_fr = Stub::from_file(fs, "a.md", "/", "fr", "en").unwrap();
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_ne!(a1, a_fr);
    }

    #[test]
    fn test_make_reads_current_bytes() {
        let fs = Arc::new(MemoryFileSystem::new("site"));
        fs.insert("blog/hello.md", "---\ntitle: Hello\n---\nBody text");
        let stub = Stub::from_file(fs, "blog/hello.md", "/", "en", "en").unwrap();
        let page = stub.make(&FormatProvider::with_defaults()).unwrap();
        assert_eq!(page.title, "Hello");
        assert_eq!(page.url, "/blog/hello");
        assert_eq!(page.shasum, stub.shasum);
    }

    #[test]
    fn test_make_rejects_binary() {
        let fs = Arc::new(MemoryFileSystem::new("site"));
        fs.insert("bad.txt", vec![0xff, 0xfe, 0x00]);
        let stub = Stub::from_file(fs, "bad.txt", "/", "en", "en").unwrap();
        assert_eq!(stub.make(&FormatProvider::with_defaults()).unwrap_err().kind, ErrorKind::InvalidInput);
    }
}
