use chrono::{DateTime, Duration, Utc};

use postpulse_core::analytics::{BackfillStatus, BackfillStep};
use postpulse_core::BACKFILL_CHUNK_SIZE;
use postpulse_duckdb::{Counter, DuckDbBackend};

fn at(offset: Duration) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).expect("valid base time") + offset
}

/// Write historical events straight into the log, bypassing the counters.
async fn seed_raw_events(db: &DuckDbBackend, count: usize, sessions: usize) {
    let conn = db.conn_for_test().await;
    let base = at(Duration::zero()).timestamp_millis();
    for i in 0..count {
        conn.execute(
            "INSERT INTO page_views (id, path, page_type, session_id, ts) \
             VALUES (?1, ?2, 'blog', ?3, ?4)",
            postpulse_duckdb::duckdb::params![
                format!("evt-{i:05}"),
                format!("/post-{}", i % 7),
                format!("session-{}", i % sessions),
                // Pairs of events share a timestamp so the id tiebreak matters.
                base + (i / 2) as i64,
            ],
        )
        .expect("seed event");
    }
}

/// Run chunks until the chain stops, returning how many chunks ran.
async fn run_to_completion(db: &DuckDbBackend, start: BackfillStep) -> usize {
    let mut step = start;
    let mut chunks = 0;
    loop {
        let progress = db
            .backfill_chunk_at(&step, at(Duration::minutes(1)))
            .await
            .expect("chunk");
        chunks += 1;
        match progress.next {
            Some(next) => step = next,
            None => {
                assert_eq!(progress.status, BackfillStatus::Complete);
                return chunks;
            }
        }
    }
}

async fn aggregate(db: &DuckDbBackend, counter: Counter) -> u64 {
    db.aggregate_count(counter, None).await.expect("count")
}

#[tokio::test]
async fn backfill_counts_every_event_and_session_across_chunks() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    seed_raw_events(&db, 1234, 40).await;
    assert_eq!(aggregate(&db, Counter::TotalViews).await, 0);

    db.begin_backfill_at(at(Duration::zero())).await.expect("begin");
    let chunks = run_to_completion(&db, BackfillStep::from_start()).await;

    assert_eq!(chunks, 1234usize.div_ceil(BACKFILL_CHUNK_SIZE));
    assert_eq!(aggregate(&db, Counter::TotalViews).await, 1234);
    assert_eq!(aggregate(&db, Counter::UniqueVisitors).await, 40);

    let per_path: u64 = {
        let mut sum = 0;
        for p in 0..7 {
            sum += db
                .aggregate_count(Counter::ViewsByPath, Some(&format!("/post-{p}")))
                .await
                .expect("path");
        }
        sum
    };
    assert_eq!(per_path, 1234);

    let checkpoint = db.backfill_status().await.expect("status").expect("row");
    assert_eq!(checkpoint.status, BackfillStatus::Complete);
    assert_eq!(checkpoint.processed, 1234);
    assert_eq!(checkpoint.unique_sessions, 40);
    assert!(checkpoint.cursor.is_none());
    assert!(checkpoint.resume_step().expect("cursor").is_none());
}

#[tokio::test]
async fn checkpoint_tracks_an_in_progress_run() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    seed_raw_events(&db, BACKFILL_CHUNK_SIZE + 10, 3).await;

    db.begin_backfill_at(at(Duration::zero())).await.expect("begin");
    let progress = db
        .backfill_chunk_at(&BackfillStep::from_start(), at(Duration::seconds(5)))
        .await
        .expect("first chunk");
    assert_eq!(progress.status, BackfillStatus::InProgress);
    assert_eq!(progress.processed, BACKFILL_CHUNK_SIZE as u64);

    let checkpoint = db.backfill_status().await.expect("status").expect("row");
    assert_eq!(checkpoint.status, BackfillStatus::InProgress);
    assert_eq!(checkpoint.processed, BACKFILL_CHUNK_SIZE as u64);
    assert_eq!(checkpoint.seen_session_ids.len(), 3);
    assert_eq!(checkpoint.started_at, at(Duration::zero()).timestamp_millis());
    assert_eq!(checkpoint.updated_at, at(Duration::seconds(5)).timestamp_millis());

    // The stored checkpoint resumes exactly where the chunk chain would.
    let resumed = checkpoint
        .resume_step()
        .expect("cursor")
        .expect("resumable");
    let next = progress.next.expect("next step");
    assert_eq!(resumed.cursor, next.cursor);
    assert_eq!(resumed.total_processed, next.total_processed);

    let final_progress = db
        .backfill_chunk_at(&resumed, at(Duration::seconds(10)))
        .await
        .expect("last chunk");
    assert_eq!(final_progress.status, BackfillStatus::Complete);
    assert_eq!(final_progress.processed, BACKFILL_CHUNK_SIZE as u64 + 10);
    assert_eq!(aggregate(&db, Counter::TotalViews).await, BACKFILL_CHUNK_SIZE as u64 + 10);
    assert_eq!(aggregate(&db, Counter::UniqueVisitors).await, 3);
}

#[tokio::test]
async fn restarting_from_the_beginning_does_not_double_count() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    seed_raw_events(&db, 1100, 25).await;

    db.begin_backfill_at(at(Duration::zero())).await.expect("begin");
    db.backfill_chunk_at(&BackfillStep::from_start(), at(Duration::zero()))
        .await
        .expect("partial run");

    db.begin_backfill_at(at(Duration::minutes(1))).await.expect("restart");
    run_to_completion(&db, BackfillStep::from_start()).await;

    assert_eq!(aggregate(&db, Counter::TotalViews).await, 1100);
    assert_eq!(aggregate(&db, Counter::UniqueVisitors).await, 25);
}

#[tokio::test]
async fn backfill_after_live_traffic_is_a_no_op_on_counts() {
    use postpulse_core::event::PageViewInput;

    let db = DuckDbBackend::open_in_memory().expect("db");
    for (i, session) in ["a", "b", "a"].iter().enumerate() {
        db.record_page_view_at(
            &PageViewInput::new(&format!("/p{i}"), "blog", session),
            at(Duration::seconds(i as i64)),
        )
        .await
        .expect("record");
    }
    assert_eq!(aggregate(&db, Counter::TotalViews).await, 3);
    assert_eq!(aggregate(&db, Counter::UniqueVisitors).await, 2);

    db.begin_backfill_at(at(Duration::minutes(1))).await.expect("begin");
    run_to_completion(&db, BackfillStep::from_start()).await;

    assert_eq!(aggregate(&db, Counter::TotalViews).await, 3);
    assert_eq!(aggregate(&db, Counter::UniqueVisitors).await, 2);
}

#[tokio::test]
async fn empty_log_completes_in_one_chunk() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    assert!(!db.has_page_views().await.expect("has views"));

    db.begin_backfill_at(at(Duration::zero())).await.expect("begin");
    let progress = db
        .backfill_chunk_at(&BackfillStep::from_start(), at(Duration::zero()))
        .await
        .expect("chunk");
    assert_eq!(progress.status, BackfillStatus::Complete);
    assert_eq!(progress.processed, 0);
    assert!(progress.next.is_none());
}

#[tokio::test]
async fn failed_run_is_recorded_and_not_resumable() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    assert!(db.backfill_status().await.expect("status").is_none());

    db.begin_backfill_at(at(Duration::zero())).await.expect("begin");
    db.fail_backfill_at("disk full", at(Duration::seconds(3)))
        .await
        .expect("fail");

    let checkpoint = db.backfill_status().await.expect("status").expect("row");
    assert_eq!(checkpoint.status, BackfillStatus::Failed);
    assert_eq!(checkpoint.error.as_deref(), Some("disk full"));
    assert!(checkpoint.resume_step().expect("cursor").is_none());

    // A fresh run clears the failure.
    db.begin_backfill_at(at(Duration::minutes(1))).await.expect("begin again");
    let checkpoint = db.backfill_status().await.expect("status").expect("row");
    assert_eq!(checkpoint.status, BackfillStatus::InProgress);
    assert!(checkpoint.error.is_none());
}

#[tokio::test]
async fn sessions_past_the_seen_cap_keep_the_counter_exact() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let seen_cap = 5;
    let total = BACKFILL_CHUNK_SIZE + 10;
    {
        // Chunk one: ten sessions. Chunk two: three fresh sessions, then two
        // that fell out of the carried window and one that stayed in it.
        let mut conn = db.conn_for_test().await;
        let tx = conn.transaction().expect("begin seed");
        let base = at(Duration::zero()).timestamp_millis();
        for i in 0..total {
            let session = match i.checked_sub(BACKFILL_CHUNK_SIZE) {
                None => format!("a-{}", i % 10),
                Some(j @ 0..=6) => format!("b-{}", j % 3),
                Some(7) => "a-0".to_string(),
                Some(8) => "a-1".to_string(),
                Some(_) => "a-9".to_string(),
            };
            tx.execute(
                "INSERT INTO page_views (id, path, page_type, session_id, ts) \
                 VALUES (?1, '/cap', 'blog', ?2, ?3)",
                postpulse_duckdb::duckdb::params![format!("evt-{i:05}"), session, base + i as i64],
            )
            .expect("seed event");
        }
        tx.commit().expect("commit seed");
    }

    db.begin_backfill_at(at(Duration::zero())).await.expect("begin");
    let first = db
        .backfill_chunk_capped_at(&BackfillStep::from_start(), seen_cap, at(Duration::zero()))
        .await
        .expect("first chunk");
    let next = first.next.expect("second chunk queued");
    assert_eq!(next.seen_session_ids, vec!["a-5", "a-6", "a-7", "a-8", "a-9"]);

    let last = db
        .backfill_chunk_capped_at(&next, seen_cap, at(Duration::seconds(1)))
        .await
        .expect("last chunk");
    assert_eq!(last.status, BackfillStatus::Complete);
    assert_eq!(last.processed, total as u64);
    // Carried five, three fresh, two re-seen after eviction.
    assert_eq!(last.unique_sessions, 10);

    assert_eq!(aggregate(&db, Counter::UniqueVisitors).await, 13);
    assert_eq!(aggregate(&db, Counter::TotalViews).await, total as u64);
    let stats = db.get_stats_at(at(Duration::minutes(1))).await.expect("stats");
    assert_eq!(stats.unique_visitors, 13);
}
