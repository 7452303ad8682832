use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tally::{MAX_WRITE_ATTEMPTS, PublishError, TotalSource, publish_document, run_publish};
use tally_config::{PublishSettings, SettingsOverrides, TallyConfig, resolve_settings};
use tally_github::{MemoryStore, RemoteStore, RepoRef, RepositoryMeta};

const PATH: &str = "gh-dl/downloads.json";
const BRANCH: &str = "gh-pages";

fn overrides() -> SettingsOverrides {
    SettingsOverrides {
        owner: Some("octo".to_owned()),
        repo: Some("widgets".to_owned()),
        ..SettingsOverrides::default()
    }
}

fn settings(overrides: SettingsOverrides) -> PublishSettings {
    resolve_settings(&TallyConfig::default(), overrides, None).expect("settings")
}

fn chart_settings(types: &str, themes: &str) -> PublishSettings {
    settings(SettingsOverrides {
        publish_chart: Some(true),
        chart_types: Some(types.to_owned()),
        chart_themes: Some(themes.to_owned()),
        ..overrides()
    })
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 18, hour, 0, 0)
        .single()
        .expect("timestamp")
}

fn public() -> RepositoryMeta {
    RepositoryMeta {
        default_branch: "main".to_owned(),
        private: false,
    }
}

fn stored_json(store: &MemoryStore) -> Value {
    let content = store
        .file_content(PATH, BRANCH)
        .expect("store")
        .expect("document present");
    serde_json::from_str(&content).expect("stored document is json")
}

#[tokio::test]
async fn conflicting_write_is_retried_with_a_fresh_read() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::public(20);
    store.put_file(
        PATH,
        BRANCH,
        r#"{"owner":"octo","repo":"widgets","snapshots":{"series":{"2026-02-17":12}}}"#,
    )?;
    store.inject_conflicts(PATH, 1)?;

    let outcome = publish_document(&store, &settings(overrides()), &public(), at(12)).await?;

    assert!(outcome.changed);
    assert_eq!(outcome.attempts, 2);

    let reads = store.reads()?;
    let writes = store.writes()?;
    assert_eq!(reads.len(), 2);
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].expected_version, reads[0].1);
    assert_eq!(writes[1].expected_version, reads[1].1);
    assert_ne!(reads[0].1, reads[1].1);
    assert!(!writes[0].accepted);
    assert!(writes[1].accepted);

    // The total is aggregated once even though the cycle ran twice.
    assert_eq!(store.aggregate_calls()?, 1);
    assert_eq!(stored_json(&store)["stats"]["day"], 8);
    Ok(())
}

#[tokio::test]
async fn conflicts_past_the_attempt_bound_are_fatal() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::public(5);
    store.inject_conflicts(PATH, MAX_WRITE_ATTEMPTS)?;

    let err = publish_document(&store, &settings(overrides()), &public(), at(12))
        .await
        .expect_err("every write conflicts");

    match err {
        PublishError::ConflictRetriesExhausted {
            path,
            attempts,
            source,
        } => {
            assert_eq!(path, PATH);
            assert_eq!(attempts, MAX_WRITE_ATTEMPTS);
            assert!(source.is_conflict());
        }
        other => panic!("unexpected error: {other}"),
    }
    let writes = store.writes()?;
    assert_eq!(writes.len(), MAX_WRITE_ATTEMPTS as usize);
    assert!(writes.iter().all(|write| !write.accepted));
    Ok(())
}

#[tokio::test]
async fn foreign_document_starts_a_fresh_series() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::public(77);
    store.put_file(
        PATH,
        BRANCH,
        r#"{"owner":"someone","repo":"else","generatedAt":"2026-02-18T11:59:00.000Z",
            "stats":{"total":1000},"snapshots":{"series":{"2026-02-17":900}}}"#,
    )?;
    let settings = settings(SettingsOverrides {
        min_refresh_minutes: Some(60),
        ..overrides()
    });

    let outcome = publish_document(&store, &settings, &public(), at(12)).await?;

    assert_eq!(outcome.total_source, TotalSource::Api);
    assert_eq!(outcome.document.snapshots.count, 1);
    assert_eq!(outcome.document.stats.total, 77);
    assert_eq!(outcome.document.stats.day, 0);
    assert!(outcome.document.partial.day);

    let stored = stored_json(&store);
    assert_eq!(stored["owner"], "octo");
    assert!(stored["snapshots"]["series"].get("2026-02-17").is_none());
    Ok(())
}

#[tokio::test]
async fn windowed_merge_and_partial_flags_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::public(13);
    store.put_file(
        PATH,
        BRANCH,
        r#"{"owner":"octo","repo":"widgets","snapshots":{"series":
            {"2026-02-15":10,"2026-02-16":11,"2026-02-17":12}}}"#,
    )?;
    let settings = settings(SettingsOverrides {
        window_days: Some(2),
        ..overrides()
    });

    let outcome = publish_document(&store, &settings, &public(), at(12)).await?;
    let document = &outcome.document;

    assert_eq!(document.snapshots.count, 2);
    assert_eq!(document.snapshots.first_date.as_deref(), Some("2026-02-17"));
    assert_eq!(document.snapshots.last_date.as_deref(), Some("2026-02-18"));
    assert_eq!(
        (document.stats.day, document.stats.week, document.stats.month),
        (1, 1, 1)
    );
    assert!(!document.partial.day);
    assert!(document.partial.week);
    assert!(document.partial.month);

    let stored = stored_json(&store);
    assert_eq!(
        stored["snapshots"]["series"],
        serde_json::json!({"2026-02-17": 12, "2026-02-18": 13})
    );
    Ok(())
}

#[tokio::test]
async fn run_creates_output_branch_from_default_branch() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::public(3);
    assert!(!store.has_branch(BRANCH)?);

    let report = run_publish(&store, &settings(overrides()), at(12)).await?;

    assert!(store.has_branch(BRANCH)?);
    assert!(report.outcome.changed);
    assert_eq!(report.charts.total_count, 0);
    assert_eq!(report.chart_status(), "disabled");
    Ok(())
}

#[tokio::test]
async fn chart_matrix_is_published_once_per_path() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::public(50);
    let settings = chart_settings("total-trend,daily", "slate,black");

    let first = run_publish(&store, &settings, at(12)).await?;
    assert_eq!(first.charts.total_count, 5);
    assert_eq!(first.charts.published_count, 5);
    assert_eq!(
        first.charts.files,
        vec![
            "gh-dl/downloads-trend.svg",
            "gh-dl/charts/total-trend--slate.svg",
            "gh-dl/charts/total-trend--black.svg",
            "gh-dl/charts/daily--slate.svg",
            "gh-dl/charts/daily--black.svg",
        ]
    );

    let messages: Vec<String> = store
        .writes()?
        .into_iter()
        .filter(|write| write.path.ends_with(".svg"))
        .map(|write| write.message)
        .collect();
    assert!(messages[0].ends_with(" [chart:total-trend/slate]"));
    assert!(messages[4].ends_with(" [chart:daily/black]"));

    let svg = store
        .file_content("gh-dl/charts/daily--black.svg", BRANCH)?
        .expect("chart stored");
    assert!(svg.contains("<svg xmlns=\"http://www.w3.org/2000/svg\""));

    // Same instant, same data: nothing to rewrite.
    let second = run_publish(&store, &settings, at(12)).await?;
    assert!(!second.outcome.changed);
    assert_eq!(second.charts.published_count, 0);
    assert!(!second.charts.published_any());
    assert_eq!(second.chart_status(), "0/5 updated");
    Ok(())
}

#[tokio::test]
async fn charts_refresh_when_document_is_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::public(50);
    let settings = chart_settings("total-trend", "orange");

    run_publish(&store, &settings, at(12)).await?;
    let later = run_publish(&store, &settings, at(13)).await?;

    assert!(!later.outcome.changed);
    assert_eq!(later.charts.published_count, 2);
    let svg = store
        .file_content("gh-dl/downloads-trend.svg", BRANCH)?
        .expect("chart stored");
    assert!(svg.contains("2026-02-18T13:00:00.000Z"));
    Ok(())
}

#[tokio::test]
async fn chart_conflict_is_retried() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::public(50);
    let settings = chart_settings("weekly", "slate");
    store.inject_conflicts("gh-dl/charts/weekly--slate.svg", 1)?;

    let report = run_publish(&store, &settings, at(12)).await?;

    assert_eq!(report.charts.published_count, 2);
    let chart_writes: Vec<_> = store
        .writes()?
        .into_iter()
        .filter(|write| write.path == "gh-dl/charts/weekly--slate.svg")
        .collect();
    assert_eq!(chart_writes.len(), 2);
    assert!(!chart_writes[0].accepted);
    assert!(chart_writes[1].accepted);
    Ok(())
}

#[tokio::test]
async fn memory_store_is_usable_as_trait_object() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::public(9);
    let remote: &dyn RemoteStore = &store;

    let meta = remote
        .fetch_repository_meta(&RepoRef::new("octo", "widgets"))
        .await?;
    let outcome = publish_document(remote, &settings(overrides()), &meta, at(12)).await?;
    assert_eq!(outcome.document.stats.total, 9);
    Ok(())
}

#[tokio::test]
async fn stored_document_ends_with_a_single_newline() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::public(11);

    publish_document(&store, &settings(overrides()), &public(), at(12)).await?;

    let content = store.file_content(PATH, BRANCH)?.expect("document present");
    assert!(content.ends_with("}\n"));
    assert!(!content.ends_with("\n\n"));
    Ok(())
}

#[tokio::test]
async fn totals_past_float_precision_are_stored_exactly() -> Result<(), Box<dyn std::error::Error>> {
    let large = (1u64 << 53) + 1;
    let store = MemoryStore::public(large);

    let outcome = publish_document(&store, &settings(overrides()), &public(), at(12)).await?;

    assert_eq!(outcome.document.stats.total, large);
    assert_eq!(stored_json(&store)["snapshots"]["series"]["2026-02-18"], large);
    Ok(())
}
