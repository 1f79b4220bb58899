//! Live integration tests for brandnotify-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/brandnotify-db/`), so `"../../migrations"` resolves to the
//! workspace migration directory.

use std::collections::BTreeSet;

use brandnotify_core::{
    normalize, AbandonedRecord, AnalysisLookup, BrandConfig, Classification, CompletionLedger,
    CursorStore, LedgerError, OptOutList, ReportSource, RetryFailure, RetryLedger, RetryPolicy,
    ThrottleDecision, ThrottleLedger,
};
use brandnotify_db::{
    insert_report, seed_brands, upsert_analysis, NewAnalysis, NewReport, PgStore,
};
use chrono::{Duration, TimeZone, Utc};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

async fn stage_report(pool: &sqlx::PgPool, seq: i64, language: &str, brand: &str) {
    insert_report(
        pool,
        &NewReport {
            seq,
            public_id: &format!("rpt-{seq}"),
            latitude: 47.37,
            longitude: 8.54,
            image: Some(&[0xFF, 0xD8, 0xFF][..]),
            submitted_at: t0(),
        },
    )
    .await
    .unwrap_or_else(|e| panic!("insert_report failed for seq {seq}: {e}"));

    upsert_analysis(
        pool,
        &NewAnalysis {
            seq,
            language,
            brand_name: brand,
            brand_display_name: brand,
            title: "Bottle on the beach",
            description: "",
            hazard_probability: 0.2,
            severity_level: 0.5,
            inferred_contact_emails: "press@nike.com",
            classification: Classification::Physical,
        },
    )
    .await
    .unwrap_or_else(|e| panic!("upsert_analysis failed for seq {seq}: {e}"));
}

// ---------------------------------------------------------------------------
// Section 1: Throttle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn throttle_first_acquire_allowed_then_throttled(pool: sqlx::PgPool) {
    let store = PgStore::new(pool, "en");
    let key = normalize("Nike");
    let cooldown = Duration::days(7);

    let first = store.try_acquire(&key, cooldown, t0()).await.unwrap();
    assert_eq!(first, ThrottleDecision::Allowed);

    let second = store
        .try_acquire(&key, cooldown, t0() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(
        second,
        ThrottleDecision::Throttled {
            retry_after: t0() + cooldown
        }
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn throttle_boundary_is_inclusive(pool: sqlx::PgPool) {
    let store = PgStore::new(pool, "en");
    let key = normalize("Nike");
    let cooldown = Duration::hours(1);

    store.try_acquire(&key, cooldown, t0()).await.unwrap();
    let at_boundary = store
        .try_acquire(&key, cooldown, t0() + cooldown)
        .await
        .unwrap();
    assert_eq!(at_boundary, ThrottleDecision::Allowed);
}

#[sqlx::test(migrations = "../../migrations")]
async fn throttle_concurrent_acquires_yield_one_window(pool: sqlx::PgPool) {
    let store = PgStore::new(pool, "en");
    let key = normalize("Nike");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            store.try_acquire(&key, Duration::days(7), t0()).await
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() == ThrottleDecision::Allowed {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 1);
}

// ---------------------------------------------------------------------------
// Section 2: Retry and abandonment
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn retry_attempts_increase_and_schedule_backoff(pool: sqlx::PgPool) {
    let store = PgStore::new(pool, "en");
    let policy = RetryPolicy::default();
    let failure = RetryFailure {
        seq: 11,
        brand_key: normalize("Nike"),
        pending_recipients: BTreeSet::from(["press@nike.com".to_string()]),
        reason: "provider returned 503".to_string(),
    };

    let first = store.record_failure(&failure, &policy, t0()).await.unwrap();
    let second = store.record_failure(&failure, &policy, t0()).await.unwrap();
    assert_eq!((first, second), (1, 2));

    let record = store.get(11).await.unwrap().expect("retry row should exist");
    assert_eq!(record.attempts, 2);
    assert_eq!(record.next_eligible_at, t0() + Duration::minutes(2));
    assert_eq!(record.pending_recipients, failure.pending_recipients);
    assert!(!store.is_eligible(11, t0()).await.unwrap());
    assert!(store
        .is_eligible(11, t0() + Duration::minutes(2))
        .await
        .unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn claim_requires_due_row_with_expected_attempts(pool: sqlx::PgPool) {
    let store = PgStore::new(pool, "en");
    let failure = RetryFailure {
        seq: 14,
        brand_key: normalize("Nike"),
        pending_recipients: BTreeSet::from(["press@nike.com".to_string()]),
        reason: "provider returned 503".to_string(),
    };
    store
        .record_failure(&failure, &RetryPolicy::default(), t0())
        .await
        .unwrap();
    let due = t0() + Duration::minutes(1);
    let lease = Duration::minutes(10);

    assert!(!store.claim(14, 1, t0(), lease).await.unwrap(), "not due yet");
    assert!(!store.claim(14, 2, due, lease).await.unwrap(), "stale attempt count");
    assert!(!store.claim(99, 0, due, lease).await.unwrap(), "no row");

    assert!(store.claim(14, 1, due, lease).await.unwrap());
    assert!(!store.claim(14, 1, due, lease).await.unwrap(), "already leased");

    let record = store.get(14).await.unwrap().expect("retry row should exist");
    assert_eq!(record.attempts, 1);
    assert_eq!(record.next_eligible_at, due + lease);
    assert!(store.claim(14, 1, due + lease, lease).await.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_claims_yield_one_winner(pool: sqlx::PgPool) {
    let store = PgStore::new(pool, "en");
    let failure = RetryFailure {
        seq: 15,
        brand_key: normalize("Nike"),
        pending_recipients: BTreeSet::from(["press@nike.com".to_string()]),
        reason: "timeout".to_string(),
    };
    store
        .record_failure(&failure, &RetryPolicy::default(), t0())
        .await
        .unwrap();
    let due = t0() + Duration::minutes(5);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.claim(15, 1, due, Duration::minutes(10)).await
        }));
    }

    let mut claimed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            claimed += 1;
        }
    }
    assert_eq!(claimed, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn abandon_moves_seq_out_of_retry(pool: sqlx::PgPool) {
    let store = PgStore::new(pool, "en");
    let failure = RetryFailure {
        seq: 12,
        brand_key: normalize("Nike"),
        pending_recipients: BTreeSet::new(),
        reason: "timeout".to_string(),
    };
    store
        .record_failure(&failure, &RetryPolicy::default(), t0())
        .await
        .unwrap();

    store
        .abandon(&AbandonedRecord {
            seq: 12,
            brand_key: normalize("Nike"),
            attempts: 1,
            reason: "invalid recipient".to_string(),
            abandoned_at: t0(),
        })
        .await
        .unwrap();

    assert!(store.get(12).await.unwrap().is_none());
    assert_eq!(
        store.abandoned_among(&[11, 12, 13]).await.unwrap(),
        BTreeSet::from([12])
    );
}

// ---------------------------------------------------------------------------
// Section 3: Completion and cursor
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn mark_completed_is_idempotent(pool: sqlx::PgPool) {
    let store = PgStore::new(pool, "en");
    store.mark_completed(&[1, 2], t0()).await.unwrap();
    store.mark_completed(&[2, 3], t0()).await.unwrap();

    assert_eq!(
        store.completed_among(&[1, 2, 3, 4]).await.unwrap(),
        BTreeSet::from([1, 2, 3])
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn cursor_defaults_to_zero_and_rejects_regression(pool: sqlx::PgPool) {
    let store = PgStore::new(pool, "en");
    assert_eq!(store.read("brand-notifier").await.unwrap(), 0);

    store.advance("brand-notifier", 10).await.unwrap();
    store.advance("brand-notifier", 10).await.unwrap();
    assert_eq!(store.read("brand-notifier").await.unwrap(), 10);

    let err = store.advance("brand-notifier", 4).await.unwrap_err();
    assert_eq!(
        err,
        LedgerError::Regression {
            consumer: "brand-notifier".to_string(),
            current: 10,
            requested: 4,
        }
    );
    assert_eq!(store.read("brand-notifier").await.unwrap(), 10);
}

// ---------------------------------------------------------------------------
// Section 4: Report source
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn analysis_lookup_respects_language(pool: sqlx::PgPool) {
    stage_report(&pool, 21, "en", "Nike").await;
    stage_report(&pool, 22, "de", "Nike").await;
    let store = PgStore::new(pool, "en");

    match store.get_analysis(21).await.unwrap() {
        AnalysisLookup::Ready(analysis) => {
            assert_eq!(analysis.brand_name, "Nike");
            assert_eq!(analysis.classification, Classification::Physical);
        }
        AnalysisLookup::NotYetAnalyzed => panic!("seq 21 should be analyzed"),
    }
    assert_eq!(
        store.get_analysis(22).await.unwrap(),
        AnalysisLookup::NotYetAnalyzed
    );
    assert_eq!(
        store.report_image(21).await.unwrap(),
        Some(vec![0xFF, 0xD8, 0xFF])
    );
    assert!(store.get_report(99).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn feeds_split_on_cursor_and_skip_finished(pool: sqlx::PgPool) {
    for seq in [1, 2, 3, 4, 5] {
        stage_report(&pool, seq, "en", "Nike").await;
    }
    let store = PgStore::new(pool, "en");
    store.mark_completed(&[1], t0()).await.unwrap();
    store
        .abandon(&AbandonedRecord {
            seq: 2,
            brand_key: normalize("Nike"),
            attempts: 5,
            reason: "gave up".to_string(),
            abandoned_at: t0(),
        })
        .await
        .unwrap();

    assert_eq!(store.list_analyzed_after(3, 100).await.unwrap(), vec![4, 5]);
    assert_eq!(store.list_unfinished_up_to(0, 3, 100).await.unwrap(), vec![3]);
    assert_eq!(store.list_unfinished_up_to(0, 5, 1).await.unwrap(), vec![3]);
    assert_eq!(store.list_unfinished_up_to(3, 5, 100).await.unwrap(), vec![4, 5]);
    assert_eq!(store.list_analyzed_after(0, 2).await.unwrap(), vec![1, 2]);
}

// ---------------------------------------------------------------------------
// Section 5: Opt-outs and seeding
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn opt_out_is_case_insensitive_and_idempotent(pool: sqlx::PgPool) {
    let store = PgStore::new(pool, "en");
    assert!(store.opt_out("Press@Nike.com").await.unwrap());
    assert!(!store.opt_out("press@nike.com").await.unwrap());
    assert!(store.is_opted_out("PRESS@nike.com").await.unwrap());

    let among = store
        .opted_out_among(&BTreeSet::from([
            "press@nike.com".to_string(),
            "legal@nike.com".to_string(),
        ]))
        .await
        .unwrap();
    assert_eq!(among, BTreeSet::from(["press@nike.com".to_string()]));
}

#[sqlx::test(migrations = "../../migrations")]
async fn seed_brands_upserts_by_key(pool: sqlx::PgPool) {
    let brands = vec![BrandConfig {
        name: "Procter & Gamble".to_string(),
        display_name: Some("P&G".to_string()),
        cooldown_secs: Some(3600),
        contact_emails: vec!["media@pg.example".to_string()],
    }];

    assert_eq!(seed_brands(&pool, &brands).await.unwrap(), 1);
    assert_eq!(seed_brands(&pool, &brands).await.unwrap(), 1);

    let (key, display): (String, String) =
        sqlx::query_as("SELECT brand_key, display_name FROM brands")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(key, "proctergamble");
    assert_eq!(display, "P&G");
}
