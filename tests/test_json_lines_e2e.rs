/// End-to-end: tenants served from JSON-lines files with per-tenant config
/// files, refreshed when the data file changes.
mod common;

use common::{init_tracing, phrases};
use flapjack_suggest::{
    FileConfigProvider, JsonLinesDataProvider, MatchKind, RefreshOutcome, SuggestError,
    SuggestManager,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tempfile::TempDir;

const SHOES: &[&str] = &[
    r#"{"primaryText":"Nike Air Max","weight":90,"tags":["brand:nike"]}"#,
    r#"{"primaryText":"Nike Pegasus","weight":70,"tags":["brand:nike"]}"#,
    r#"{"primaryText":"Nike socks","weight":60,"tags":["brand:nike"]}"#,
    r#"{"primaryText":"Nikon camera","weight":80,"tags":["brand:nikon"]}"#,
];

fn write_records(dir: &Path, tenant: &str, lines: &[&str], mtime_secs: u64) {
    let path = dir.join(format!("{}.jsonl", tenant));
    std::fs::write(&path, lines.join("\n")).unwrap();
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(UNIX_EPOCH + Duration::from_secs(mtime_secs))
        .unwrap();
}

struct Fixture {
    data: TempDir,
    configs: TempDir,
    manager: Arc<SuggestManager>,
}

fn fixture() -> Fixture {
    init_tracing();
    let data = TempDir::new().unwrap();
    let configs = TempDir::new().unwrap();
    let manager = SuggestManager::builder()
        .data_provider(Arc::new(JsonLinesDataProvider::new(data.path())))
        .config_provider(Arc::new(FileConfigProvider::new(configs.path())))
        .build()
        .unwrap();
    Fixture {
        data,
        configs,
        manager,
    }
}

#[test]
fn test_grouping_and_sharpened_queries_from_files() {
    let f = fixture();
    write_records(f.data.path(), "shop", SHOES, 1_700_000_000);
    std::fs::write(
        f.data.path().join("shop.meta.json"),
        r#"{"sharpenedQueries":{"nik":["nike sale"]},"wordsToIgnore":["cheap"]}"#,
    )
    .unwrap();
    std::fs::write(
        f.configs.path().join("shop.json"),
        r#"{
            "groupKey": "brand",
            "groupConfig": [
                {"groupName": "nike", "limit": 2},
                {"groupName": "nikon", "limit": 1}
            ]
        }"#,
    )
    .unwrap();

    let hits = f.manager.suggest("shop", "Nik", &HashMap::new(), 5).unwrap();
    assert_eq!(
        phrases(&hits),
        vec!["nike sale", "Nike Air Max", "Nikon camera", "Nike Pegasus"]
    );
    assert_eq!(hits[0].kind, MatchKind::Sharpened);
    let groups: Vec<&str> = hits.iter().map(|h| h.group.as_str()).collect();
    assert_eq!(groups, vec!["other", "nike", "nikon", "nike"]);

    // "cheap" is dropped, the last word always stays
    let hits = f
        .manager
        .suggest("shop", "cheap nike", &HashMap::new(), 5)
        .unwrap();
    assert_eq!(phrases(&hits), vec!["Nike Air Max", "Nike Pegasus"]);
}

#[test]
fn test_tantivy_backend_matches_trie() {
    let f = fixture();
    write_records(f.data.path(), "trie", SHOES, 1_700_000_000);
    write_records(f.data.path(), "tantivy", SHOES, 1_700_000_000);
    std::fs::write(
        f.configs.path().join("tantivy.json"),
        r#"{"indexBackend": "tantivy"}"#,
    )
    .unwrap();

    let expected = vec!["Nike Air Max", "Nikon camera", "Nike Pegasus", "Nike socks"];
    for tenant in ["trie", "tantivy"] {
        let hits = f.manager.suggest(tenant, "nikr", &HashMap::new(), 10).unwrap();
        assert_eq!(phrases(&hits), expected, "backend {}", tenant);
        assert!(hits.iter().all(|h| h.kind == MatchKind::Fuzzy1));
    }
}

#[tokio::test]
async fn test_refresh_follows_file_mtime() {
    let f = fixture();
    write_records(f.data.path(), "shop", SHOES, 1_700_000_000);
    f.manager.suggester("shop").unwrap();
    assert_eq!(
        f.manager.refresh("shop").await.unwrap(),
        RefreshOutcome::Unchanged
    );

    write_records(
        f.data.path(),
        "shop",
        &[r#"{"primaryText":"Nike Vaporfly","weight":100}"#],
        1_700_000_100,
    );
    assert_eq!(
        f.manager.refresh("shop").await.unwrap(),
        RefreshOutcome::Updated {
            records: 1,
            modified: 1_700_000_100_000,
        }
    );
    let hits = f.manager.suggest("shop", "nike", &HashMap::new(), 5).unwrap();
    assert_eq!(phrases(&hits), vec!["Nike Vaporfly"]);
    assert_eq!(
        f.manager.stats("shop").unwrap().last_modified,
        1_700_000_100_000
    );
}

#[tokio::test]
async fn test_malformed_line_fails_refresh_and_keeps_data() {
    let f = fixture();
    write_records(f.data.path(), "shop", SHOES, 1_700_000_000);
    f.manager.suggester("shop").unwrap();

    write_records(
        f.data.path(),
        "shop",
        &[r#"{"primaryText":"Nike Vaporfly","weight":100}"#, "{not json"],
        1_700_000_100,
    );
    match f.manager.refresh("shop").await.unwrap_err() {
        SuggestError::Build { tenant, reason } => {
            assert_eq!(tenant, "shop");
            assert!(reason.contains("line 2"), "reason: {}", reason);
        }
        other => panic!("expected build error, got {:?}", other),
    }

    let hits = f.manager.suggest("shop", "nike", &HashMap::new(), 5).unwrap();
    assert_eq!(hits[0].phrase, "Nike Air Max");
}

#[test]
fn test_missing_file_is_no_data() {
    let f = fixture();
    let err = f
        .manager
        .suggest("nobody", "nike", &HashMap::new(), 5)
        .unwrap_err();
    assert!(matches!(err, SuggestError::NoData(ref t) if t == "nobody"));
}
