pub mod core;
pub mod storage;
pub mod compression;
pub mod analysis;
pub mod fs;
pub mod page;
pub mod index;
pub mod query;
pub mod scoring;
pub mod search;
pub mod precache;

pub use crate::core::config::{BackendKind, Config};
pub use crate::core::engine::IndexEngine;
pub use crate::core::error::{Error, ErrorKind, ParseError, Result};
pub use crate::core::types::{PageContext, Value};

/*
┌──────────────────────────────────────────────────────────────────────────────────┐
│                             PAGEDEX STRUCT ARCHITECTURE                          │
└──────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── PAGE LAYER ──────────────────────────────────────┐
│                                                                                  │
│  struct PageCache                          trait FileSystem                      │
│  ┌──────────────────────────────────┐      ┌────────────────────────────────┐    │
│  │ mounts: Vec<Mount>               │─────▶│ LocalFileSystem  (walkdir)     │    │
│  │ formats: Arc<FormatProvider>     │      │ MemoryFileSystem               │    │
│  │ indexers: Vec<Arc<PageIndexer>>  │      │ SubFileSystem    (locale dir)  │    │
│  │ state: RwLock<CacheState>        │      └────────────────────────────────┘    │
│  └──────────────────────────────────┘                                            │
│        │ rebuild(): hash files (rayon) → Stub → Stub::make() → Page              │
│        │            → add_page(stub, page) on every PageIndexer                  │
└────────┼─────────────────────────────────────────────────────────────────────────┘
         ▼
┌──────────────────────────────── CORE LAYER ──────────────────────────────────────┐
│                                                                                  │
│  struct IndexEngine  (impl PageIndexer)                                          │
│  ┌────────────────────────────────────────────────────────────────────────────┐  │
│  │ config: Config                                                             │  │
│  │ store: Arc<dyn PostingsStore>     // one store, two namespaces             │  │
│  │ context: ContextIndex             // key → value → stubs   (PQL)           │  │
│  │ keywords: KeywordIndex            // token → stubs         (search)        │  │
│  │ queries: QueryCache               // LRU: text → Statement / Selection     │  │
│  │ regexes: RegexCache               // LRU: pattern → Regex                  │  │
│  │ scorer: Box<dyn Scorer>           // must / should / not                   │  │
│  │ rng: Mutex<SmallRng>              // RANDOM selections                     │  │
│  └────────────────────────────────────────────────────────────────────────────┘  │
│                                                                                  │
│  perform_query(text)  → parser → Matcher  → sort → window → shasums             │
│  perform_select(text) → parser → Selector (→ Matcher for WITHIN) → SelectResult │
│  perform_search(req)  → tokenizer → BooleanScorer → SearchEngine → envelope     │
└──────────────────────────────────────────────────────────────────────────────────┘
         │
         ▼
┌──────────────────────────────── STORAGE LAYER ───────────────────────────────────┐
│                                                                                  │
│  struct PostingsTables { store, ns }   // typed view over the shared key codec   │
│        │   stub index ⇄ shasum, token → PostingList, key → slot → PostingList    │
│        ▼                                                                         │
│  trait PostingsStore: get / set / delete / scan_prefix / write_batch             │
│  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐                          │
│  │ MemoryStore  │   │ RedbStore    │   │ SqliteStore  │                          │
│  └──────────────┘   └──────┬───────┘   └──────┬───────┘                          │
│                            └──── BufferedStore (batch + compact) ───┘            │
│                                                                                  │
│  PostingList blobs: sorted u32 → delta → vbyte                                   │
└──────────────────────────────────────────────────────────────────────────────────┘
*/
