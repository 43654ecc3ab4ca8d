mod common;

use chrono::{Duration, Local, NaiveDateTime};
use common::*;
use facegate_core::match_log::TIMESTAMP_FORMAT;
use facegate_core::{FlowError, GalleryError, LoginOutcome, MatchPolicy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn no_cancel() -> AtomicBool {
    AtomicBool::new(false)
}

#[test]
fn test_register_then_login() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();
    let gk = &fixture.gatekeeper;

    let registration = gk.register(&mut recognizer, "alice", &solid(ALICE)).unwrap();
    assert_eq!(registration.name, "alice");
    assert!(registration.path.ends_with("db/alice.png"));
    assert!(registration.path.exists());

    // Logged timestamps are truncated to microseconds
    let start = Local::now().naive_local() - Duration::microseconds(1);
    let outcome = gk.login(&mut recognizer, &solid(ALICE), &no_cancel()).unwrap();
    let (entry, similarity) = match outcome {
        LoginOutcome::Matched { entry, similarity } => (entry, similarity),
        other => panic!("expected a match, got {:?}", other),
    };
    assert_eq!(entry.name, "alice");
    assert!(similarity > 0.99);

    let lines = fixture.log_lines();
    assert_eq!(lines.len(), 1);
    let (name, timestamp) = lines[0].split_once(' ').unwrap();
    assert_eq!(name, "alice");
    let logged = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).unwrap();
    assert!(logged >= start);
    assert_eq!(lines[0], entry.to_string());
}

#[test]
fn test_login_without_face_touches_nothing() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();

    let outcome = fixture
        .gatekeeper
        .login(&mut recognizer, &solid(BLACK), &no_cancel())
        .unwrap();

    assert_eq!(outcome, LoginOutcome::NoFaceDetected);
    assert_eq!(recognizer.embed_calls.load(Ordering::SeqCst), 1);
    assert!(!fixture.gatekeeper.gallery().dir().exists());
    assert!(!fixture.gatekeeper.match_log().path().exists());
}

#[test]
fn test_unknown_user_is_not_logged() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();
    let gk = &fixture.gatekeeper;

    gk.register(&mut recognizer, "alice", &solid(ALICE)).unwrap();
    gk.register(&mut recognizer, "bob", &solid(BOB)).unwrap();

    let outcome = gk.login(&mut recognizer, &solid(NOBODY), &no_cancel()).unwrap();
    assert_eq!(outcome, LoginOutcome::UnknownUser);
    assert!(fixture.log_lines().is_empty());
}

#[test]
fn test_empty_gallery_means_unknown_user() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();

    let outcome = fixture
        .gatekeeper
        .login(&mut recognizer, &solid(ALICE), &no_cancel())
        .unwrap();
    assert_eq!(outcome, LoginOutcome::UnknownUser);
}

#[test]
fn test_register_rejects_empty_name() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();

    let err = fixture
        .gatekeeper
        .register(&mut recognizer, "   ", &solid(ALICE))
        .unwrap_err();
    assert!(matches!(err, FlowError::Gallery(GalleryError::EmptyName)));
    assert!(!fixture.gatekeeper.gallery().dir().exists());
    assert_eq!(recognizer.embed_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_register_rejects_path_in_name() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();

    let err = fixture
        .gatekeeper
        .register(&mut recognizer, "../evil", &solid(ALICE))
        .unwrap_err();
    assert!(matches!(err, FlowError::Gallery(GalleryError::InvalidName(_))));
}

#[test]
fn test_register_requires_face_by_default() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();

    let err = fixture
        .gatekeeper
        .register(&mut recognizer, "ghost", &solid(BLACK))
        .unwrap_err();
    assert!(matches!(err, FlowError::NoFaceDetected));
    assert!(fixture.gatekeeper.gallery().names().unwrap().is_empty());
}

#[test]
fn test_reregistering_replaces_reference() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();
    let gk = &fixture.gatekeeper;

    gk.register(&mut recognizer, "alice", &solid(BOB)).unwrap();
    gk.register(&mut recognizer, "alice", &solid(ALICE)).unwrap();
    assert_eq!(gk.gallery().names().unwrap(), vec!["alice".to_string()]);

    let outcome = gk.login(&mut recognizer, &solid(BOB), &no_cancel()).unwrap();
    assert_eq!(outcome, LoginOutcome::UnknownUser);
    let outcome = gk.login(&mut recognizer, &solid(ALICE), &no_cancel()).unwrap();
    assert!(matches!(outcome, LoginOutcome::Matched { .. }));
}

#[test]
fn test_best_and_first_policies() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();

    // Both clear the threshold; "a_close" sorts first but "b_exact" is closer.
    fixture
        .gatekeeper
        .register(&mut recognizer, "a_close", &solid([200, 40, 30]))
        .unwrap();
    fixture
        .gatekeeper
        .register(&mut recognizer, "b_exact", &solid(ALICE))
        .unwrap();

    let best = fixture
        .gatekeeper
        .clone()
        .with_policy(MatchPolicy::Best)
        .login(&mut recognizer, &solid(ALICE), &no_cancel())
        .unwrap();
    match best {
        LoginOutcome::Matched { entry, .. } => assert_eq!(entry.name, "b_exact"),
        other => panic!("expected a match, got {:?}", other),
    }

    let first = fixture
        .gatekeeper
        .clone()
        .with_policy(MatchPolicy::First)
        .login(&mut recognizer, &solid(ALICE), &no_cancel())
        .unwrap();
    match first {
        LoginOutcome::Matched { entry, .. } => assert_eq!(entry.name, "a_close"),
        other => panic!("expected a match, got {:?}", other),
    }

    let names: Vec<String> = fixture
        .log_lines()
        .iter()
        .map(|line| line.split(' ').next().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["b_exact", "a_close"]);
}

#[test]
fn test_faceless_reference_is_skipped() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();
    let lenient = fixture.gatekeeper.clone().require_face_on_register(false);

    lenient.register(&mut recognizer, "aaa_blank", &solid(BLACK)).unwrap();
    lenient.register(&mut recognizer, "alice", &solid(ALICE)).unwrap();

    let outcome = fixture
        .gatekeeper
        .login(&mut recognizer, &solid(ALICE), &no_cancel())
        .unwrap();
    match outcome {
        LoginOutcome::Matched { entry, .. } => assert_eq!(entry.name, "alice"),
        other => panic!("expected a match, got {:?}", other),
    }
}

#[test]
fn test_cancelled_login_writes_nothing() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();
    fixture
        .gatekeeper
        .register(&mut recognizer, "alice", &solid(ALICE))
        .unwrap();

    let cancel = AtomicBool::new(true);
    let err = fixture
        .gatekeeper
        .login(&mut recognizer, &solid(ALICE), &cancel)
        .unwrap_err();
    assert!(matches!(err, FlowError::Cancelled));
    assert!(fixture.log_lines().is_empty());
}

#[test]
fn test_log_lines_accumulate() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();
    let gk = &fixture.gatekeeper;
    gk.register(&mut recognizer, "alice", &solid(ALICE)).unwrap();
    gk.register(&mut recognizer, "bob", &solid(BOB)).unwrap();

    for face in [ALICE, BOB, ALICE] {
        gk.login(&mut recognizer, &solid(face), &no_cancel()).unwrap();
    }

    let lines = fixture.log_lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("alice "));
    assert!(lines[1].starts_with("bob "));
    assert!(lines[2].starts_with("alice "));
}

#[test]
fn test_unreadable_reference_does_not_block_login() {
    let fixture = Fixture::new();
    let gk = &fixture.gatekeeper;
    let odd = [90, 90, 90];
    let mut recognizer = ColourRecognizer::new();
    gk.register(&mut recognizer, "aaa_odd", &solid(odd)).unwrap();
    gk.register(&mut recognizer, "zed", &solid(ALICE)).unwrap();

    let mut recognizer = ColourRecognizer::new().failing_on(odd);
    let outcome = gk.login(&mut recognizer, &solid(ALICE), &no_cancel()).unwrap();
    match outcome {
        LoginOutcome::Matched { entry, .. } => assert_eq!(entry.name, "zed"),
        other => panic!("expected a match, got {:?}", other),
    }
    // Login image, the failing reference and the good one
    assert_eq!(recognizer.embed_calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_login_image_that_fails_to_embed_is_an_error() {
    let fixture = Fixture::new();
    let mut recognizer = ColourRecognizer::new();
    fixture
        .gatekeeper
        .register(&mut recognizer, "alice", &solid(ALICE))
        .unwrap();

    let mut recognizer = ColourRecognizer::new().failing_on(ALICE);
    let err = fixture
        .gatekeeper
        .login(&mut recognizer, &solid(ALICE), &no_cancel())
        .unwrap_err();
    assert!(matches!(err, FlowError::Recognition(_)));
    assert!(fixture.log_lines().is_empty());
}

#[test]
fn test_cancel_during_gallery_scan() {
    let fixture = Fixture::new();
    let gk = &fixture.gatekeeper;
    let mut recognizer = ColourRecognizer::new();
    gk.register(&mut recognizer, "alice", &solid(ALICE)).unwrap();
    gk.register(&mut recognizer, "bob", &solid(BOB)).unwrap();

    // Raised while embedding the first reference, which itself matches
    let cancel = Arc::new(AtomicBool::new(false));
    let mut recognizer = ColourRecognizer::new().cancelling_after(2, cancel.clone());
    let err = gk.login(&mut recognizer, &solid(ALICE), &cancel).unwrap_err();

    assert!(matches!(err, FlowError::Cancelled));
    assert_eq!(recognizer.embed_calls.load(Ordering::SeqCst), 2);
    assert!(fixture.log_lines().is_empty());
}
