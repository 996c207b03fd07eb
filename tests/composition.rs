// Composition tests: one article through the whole per-document chain
//   read -> chunk -> classify -> aggregate -> OutputRow
// using deterministic fake classifiers, without the worker pool.

mod common;

use std::path::Path;
use std::time::Duration;

use common::{article, write_articles, FakeLoader, FAIL_MARKER};
use slant::classifier::traits::Label;
use slant::pool::state::WorkerModelState;
use slant::processor::{self, Outcome, ProcessOptions, SkipReason};

fn loaded_state(loader: &FakeLoader) -> WorkerModelState {
    let mut state = WorkerModelState::new(0);
    state.ensure_loaded(loader).unwrap();
    state
}

// ============================================================
// Scored articles
// ============================================================

#[test]
fn single_chunk_article_maps_labels_to_signed_scores() {
    let dir = tempfile::tempdir().unwrap();
    let json = r#"{"url":"http://a","title":"T","text":"good news happened today","tags":[],"media_name":"X","publish_date":"2024-01-01"}"#;
    let path = dir.path().join("a.json");
    std::fs::write(&path, json).unwrap();

    let loader = FakeLoader::new((Label::Fact, 0.6), (Label::Positive, 0.9));
    let mut state = loaded_state(&loader);

    let outcome = processor::process_file(&path, &mut state, &ProcessOptions::default());
    let Outcome::Scored(row) = outcome else {
        panic!("expected a scored row");
    };
    assert_eq!(row.url, "http://a");
    assert_eq!(row.media_name, "X");
    assert_eq!(row.publish_date, "2024-01-01");
    assert!(row.tags.is_empty());
    assert_eq!(row.title, "T");
    assert!((row.subjectivity - (-0.6)).abs() < 1e-12);
    assert!((row.sentiment - 0.9).abs() < 1e-12);
}

#[test]
fn multi_chunk_article_is_batched_and_scored() {
    let loader = FakeLoader::new((Label::Opinion, 0.75), (Label::Negative, 0.5));
    let mut state = loaded_state(&loader);
    let options = ProcessOptions {
        max_chunk_size: 2,
        batch_size: 2,
        timeout: None,
    };

    // 9 words -> 5 chunks -> 3 batches per model
    let text = "one two three four five six seven eight nine";
    let outcome = processor::process_article(
        Path::new("multi.json"),
        article("http://multi", text),
        &mut state,
        &options,
    );

    let Outcome::Scored(row) = outcome else {
        panic!("expected a scored row");
    };
    assert!((row.subjectivity - 0.75).abs() < 1e-12);
    assert!((row.sentiment - (-0.5)).abs() < 1e-12);
    assert_eq!(loader.calls(), 6);
}

#[test]
fn scores_stay_in_range() {
    let loader = FakeLoader::new((Label::Fact, 1.0), (Label::Positive, 1.0));
    let mut state = loaded_state(&loader);
    let outcome = processor::process_article(
        Path::new("x.json"),
        article("http://x", "a b c d e f g"),
        &mut state,
        &ProcessOptions::default(),
    );
    let Outcome::Scored(row) = outcome else {
        panic!("expected a scored row");
    };
    assert!((-1.0..=1.0).contains(&row.subjectivity));
    assert!((-1.0..=1.0).contains(&row.sentiment));
}

// ============================================================
// Skips
// ============================================================

#[test]
fn empty_text_skips_without_invoking_classifiers() {
    let loader = FakeLoader::standard();
    let mut state = loaded_state(&loader);

    for text in ["", "   \n\t  "] {
        let outcome = processor::process_article(
            Path::new("empty.json"),
            article("http://empty", text),
            &mut state,
            &ProcessOptions::default(),
        );
        assert!(matches!(
            outcome,
            Outcome::Skipped {
                reason: SkipReason::EmptyText,
                ..
            }
        ));
    }
    assert_eq!(loader.calls(), 0);
}

#[test]
fn null_text_in_file_is_empty_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("null.json");
    std::fs::write(&path, r#"{"url":"http://n","text":null,"publish_date":null}"#).unwrap();

    let loader = FakeLoader::standard();
    let mut state = loaded_state(&loader);
    let outcome = processor::process_file(&path, &mut state, &ProcessOptions::default());
    assert!(matches!(
        outcome,
        Outcome::Skipped {
            reason: SkipReason::EmptyText,
            ..
        }
    ));
}

#[test]
fn malformed_and_missing_files_are_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, "{ not json").unwrap();
    let no_url = dir.path().join("no_url.json");
    std::fs::write(&no_url, r#"{"text":"some text"}"#).unwrap();
    let missing = dir.path().join("missing.json");

    let loader = FakeLoader::standard();
    let mut state = loaded_state(&loader);
    for path in [&bad, &no_url, &missing] {
        let outcome = processor::process_file(path, &mut state, &ProcessOptions::default());
        match outcome {
            Outcome::Skipped {
                source,
                reason: SkipReason::Unreadable(_),
            } => assert_eq!(&source, path),
            other => panic!("expected Unreadable for {}, got {other:?}", path.display()),
        }
    }
    assert_eq!(loader.calls(), 0);
}

#[test]
fn inference_failure_is_a_skip_and_worker_state_survives() {
    let loader = FakeLoader::standard();
    let mut state = loaded_state(&loader);
    let options = ProcessOptions::default();

    let outcome = processor::process_article(
        Path::new("fail.json"),
        article("http://fail", &format!("this will {FAIL_MARKER}")),
        &mut state,
        &options,
    );
    assert!(matches!(
        outcome,
        Outcome::Skipped {
            reason: SkipReason::Inference(_),
            ..
        }
    ));

    // Same state keeps working for the next document
    let next = processor::process_article(
        Path::new("ok.json"),
        article("http://ok", "perfectly fine text"),
        &mut state,
        &options,
    );
    assert!(matches!(next, Outcome::Scored(_)));
}

#[test]
fn timeout_between_batches_is_a_skip() {
    let mut loader = FakeLoader::standard();
    loader.delay_every_batch = true;
    loader.slow_delay = Duration::from_millis(60);
    let mut state = loaded_state(&loader);
    let options = ProcessOptions {
        max_chunk_size: 1,
        batch_size: 1,
        timeout: Some(Duration::from_millis(20)),
    };

    let outcome = processor::process_article(
        Path::new("slow.json"),
        article("http://slow", "many words means many batches here"),
        &mut state,
        &options,
    );
    assert!(matches!(
        outcome,
        Outcome::Skipped {
            reason: SkipReason::Timeout,
            ..
        }
    ));
    // Stopped after the first batch, not all seven
    assert_eq!(loader.calls(), 1);
}

#[test]
fn timeout_past_the_end_of_the_clock_never_expires() {
    let loader = FakeLoader::standard();
    let mut state = loaded_state(&loader);
    let options = ProcessOptions {
        max_chunk_size: 1,
        batch_size: 1,
        timeout: Some(Duration::MAX),
    };

    let outcome = processor::process_article(
        Path::new("patient.json"),
        article("http://patient", "three short words"),
        &mut state,
        &options,
    );
    assert!(matches!(outcome, Outcome::Scored(_)));
    assert_eq!(loader.calls(), 6);
}

#[test]
fn unloaded_state_reports_model_unavailable() {
    let mut state = WorkerModelState::new(7);
    let outcome = processor::process_article(
        Path::new("x.json"),
        article("http://x", "text"),
        &mut state,
        &ProcessOptions::default(),
    );
    assert!(matches!(
        outcome,
        Outcome::Skipped {
            reason: SkipReason::ModelUnavailable(_),
            ..
        }
    ));
}

#[test]
fn written_fixture_files_round_trip_through_processor() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_articles(
        dir.path(),
        &[article("http://1", "first text"), article("http://2", "")],
    );
    let loader = FakeLoader::standard();
    let mut state = loaded_state(&loader);

    let outcomes: Vec<Outcome> = paths
        .iter()
        .map(|p| processor::process_file(p, &mut state, &ProcessOptions::default()))
        .collect();
    assert!(matches!(&outcomes[0], Outcome::Scored(row) if row.tags == vec!["politics".to_string()]));
    assert!(matches!(
        &outcomes[1],
        Outcome::Skipped {
            reason: SkipReason::EmptyText,
            ..
        }
    ));
}
