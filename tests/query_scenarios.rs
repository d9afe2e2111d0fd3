use std::collections::BTreeSet;
use std::sync::Arc;

use pagedex::core::config::{BackendKind, Config};
use pagedex::core::error::ErrorKind;
use pagedex::fs::memory::MemoryFileSystem;
use pagedex::page::{Mount, PageCache};
use pagedex::query::selector::Selected;
use pagedex::{IndexEngine, Value};
use tempfile::tempdir;

fn site(pages: &[(&str, &str)]) -> Arc<MemoryFileSystem> {
    let fs = Arc::new(MemoryFileSystem::new("site"));
    for (path, raw) in pages {
        fs.insert(path, raw.as_bytes().to_vec());
    }
    fs
}

fn build(config: Config, fs: Arc<MemoryFileSystem>) -> (Arc<IndexEngine>, PageCache) {
    let engine = Arc::new(IndexEngine::open(config).unwrap());
    let cache = PageCache::new(engine.formats().clone(), "en")
        .with_mount(Mount::new("/", fs))
        .with_indexer(engine.clone());
    let report = cache.rebuild();
    assert!(report.is_success(), "{:?}", report.errors);
    (engine, cache)
}

fn blog() -> Arc<MemoryFileSystem> {
    site(&[
        ("blog/one.md", "---\ntype: post\nweight: 2\ntags: [rust, search]\n---\nFirst post."),
        ("blog/two.md", "---\ntype: post\nweight: 1\n---\nSecond post."),
        ("about.md", "---\ntype: page\n---\nAbout us."),
        ("news/three.md", "---\ntype: post\nweight: 3\n---\nNews post."),
    ])
}

fn set(items: Vec<String>) -> BTreeSet<String> {
    items.into_iter().collect()
}

#[test]
fn three_pages_by_type() {
    let fs = site(&[
        ("a.md", "---\nType: post\n---\na"),
        ("b.md", "---\nType: post\n---\nb"),
        ("c.md", "---\nType: page\n---\nc"),
    ]);
    let (engine, _cache) = build(Config::default(), fs);

    assert_eq!(engine.perform_query(r#"(.Type == "post")"#).unwrap().len(), 2);
    let distinct = engine.perform_select("SELECT DISTINCT .Type").unwrap();
    assert_eq!(distinct["type"], Selected::Values(vec![Value::from("post"), Value::from("page")]));
    let count = engine.perform_select("SELECT COUNT .Type").unwrap();
    assert_eq!(count["type"], Selected::Count(2));
}

#[test]
fn and_is_intersection_or_is_union() {
    let (engine, _cache) = build(Config::default(), blog());
    let posts = set(engine.perform_query(r#"(.Type == "post")"#).unwrap());
    let blog = set(engine.perform_query(r#"(.Section == "blog")"#).unwrap());

    let and = engine.perform_query(r#"((.Type == "post") AND (.Section == "blog"))"#).unwrap();
    assert_eq!(set(and), posts.intersection(&blog).cloned().collect());

    let or = engine.perform_query(r#"((.Type == "post") OR (.Type == "page"))"#).unwrap();
    assert_eq!(or.len(), 4);
    assert_eq!(set(or.clone()).len(), or.len());
}

#[test]
fn not_equal_is_complement() {
    let (engine, _cache) = build(Config::default(), blog());
    let universe = set(engine.perform_query(r#"(.Type =~ m/.*/)"#).unwrap());
    let eq = set(engine.perform_query(r#"(.Type == "post")"#).unwrap());
    let ne = set(engine.perform_query(r#"(.Type != "post")"#).unwrap());
    assert!(eq.is_disjoint(&ne));
    assert_eq!(eq.union(&ne).cloned().collect::<BTreeSet<_>>(), universe);
}

#[test]
fn list_values_and_typed_order() {
    let (engine, cache) = build(Config::default(), blog());
    let tagged = engine.perform_query(r#"(.Tags == "search")"#).unwrap();
    let sources: Vec<String> = cache.resolve(&tagged).into_iter().map(|s| s.source).collect();
    assert_eq!(sources, vec!["blog/one.md"]);

    let ordered = engine.perform_query(r#"(.Type == "post") ORDER BY .Weight DESC"#).unwrap();
    let sources: Vec<String> = cache.resolve(&ordered).into_iter().map(|s| s.source).collect();
    assert_eq!(sources, vec!["news/three.md", "blog/one.md", "blog/two.md"]);

    let err = engine.perform_query(r#"(.Weight == "heavy")"#).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
}

#[test]
fn select_within_and_columns() {
    let (engine, _cache) = build(Config::default(), blog());
    let result = engine
        .perform_select(r#"SELECT .Weight, DISTINCT .Section WITHIN (.Type == "post") ORDER BY .Weight"#)
        .unwrap();
    assert_eq!(
        result["weight"],
        Selected::Column(vec![Some(Value::Int(1)), Some(Value::Int(2)), Some(Value::Int(3))])
    );
    assert_eq!(
        result["section"],
        Selected::Values(vec![Value::from("blog"), Value::from("news")])
    );
}

#[test]
fn locale_directories_become_languages() {
    let fs = site(&[
        ("hello.md", "---\ntitle: Hello\n---\nhi"),
        ("de/hello.md", "---\ntitle: Hallo\ntranslates: /hello\n---\nhallo"),
    ]);
    let (engine, cache) = build(Config::default(), fs);
    let german = engine.perform_query(r#"(.Language == "de")"#).unwrap();
    assert_eq!(german.len(), 1);
    assert_eq!(cache.lookup("de", "/hello").map(|s| s.language), Some("de".to_string()));
    assert_eq!(cache.lookup_translations("/hello").len(), 1);
}

#[test]
fn persistent_backends_agree() {
    for kind in [BackendKind::Redb, BackendKind::Sqlite] {
        let dir = tempdir().unwrap();
        let path = dir.path().join(format!("index.{}", kind.name()));
        let config = Config::precache(kind, Some(path.clone()));
        {
            let (engine, _cache) = build(config, blog());
            engine.flush().unwrap();
        }
        let serving = IndexEngine::open(Config::serving(kind, &path)).unwrap();
        let posts = serving.perform_query(r#"(.Type == "post") ORDER BY .Weight"#).unwrap();
        assert_eq!(posts.len(), 3, "{}", kind.name());
        assert_eq!(serving.keyword_stubs("news").unwrap().len(), 1, "{}", kind.name());
    }
}
