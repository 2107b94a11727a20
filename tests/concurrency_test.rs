mod common;

use {
    common::*,
    enrollment_sync::{
        domain::{
            id::{EventId, PaymentIntentId},
            purchase::PurchaseStatus,
        },
        infra::memory::InMemoryStore,
        services::purchase_lifecycle::ProcessResult,
    },
    std::sync::Arc,
};

// ── concurrent redelivery of one event ─────────────────────────────────────
// 10 tasks deliver the same succeeded event. The per-purchase lock
// serializes them: 1 Completed, the rest see the terminal state.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_succeeded_events() {
    let store = Arc::new(InMemoryStore::new());
    let sessions = Arc::new(FakeCheckoutSessions::new());
    seed_checkout(&*store, &sessions, "pi_cdup", "P1", "U1", "C1", PurchaseStatus::Pending).await;
    let lc = Arc::new(lifecycle(store.clone(), sessions.clone()));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let lc = Arc::clone(&lc);
        handles.push(tokio::spawn(async move {
            lc.on_payment_succeeded(
                &EventId::new("evt_cdup").unwrap(),
                &PaymentIntentId::new("pi_cdup").unwrap(),
            )
            .await
            .unwrap()
        }));
    }

    let mut completed = 0;
    let mut duplicates = 0;
    for h in handles {
        match h.await.unwrap() {
            ProcessResult::Completed(_) => completed += 1,
            ProcessResult::AlreadyCompleted(_) => duplicates += 1,
            other => panic!("unexpected result: {other:?}"),
        }
    }

    assert_eq!(completed, 1, "exactly 1 Completed");
    assert_eq!(duplicates, 9, "9 AlreadyCompleted");
    assert_eq!(get_user(&*store, "U1").await.enrolled_courses.len(), 1);
    assert_eq!(get_course(&*store, "C1").await.enrolled_students.len(), 1);
    assert_eq!(sessions.calls(), 10);
}

// ── two purchases, one user ────────────────────────────────────────────────
// Different purchase locks, same user record: the version check plus reload
// must keep both course ids.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_purchases_for_same_user_keep_both_enrollments() {
    let store = Arc::new(InMemoryStore::new());
    let sessions = Arc::new(FakeCheckoutSessions::new());
    let courses = ["C_a", "C_b", "C_c"];
    for (i, course) in courses.iter().enumerate() {
        seed_checkout(
            &*store,
            &sessions,
            &format!("pi_multi_{i}"),
            &format!("P_multi_{i}"),
            "U_multi",
            course,
            PurchaseStatus::Pending,
        )
        .await;
    }
    let lc = Arc::new(lifecycle(store.clone(), sessions.clone()));

    let mut handles = Vec::new();
    for i in 0..courses.len() {
        let lc = Arc::clone(&lc);
        handles.push(tokio::spawn(async move {
            lc.on_payment_succeeded(
                &EventId::new(format!("evt_multi_{i}")).unwrap(),
                &PaymentIntentId::new(format!("pi_multi_{i}")).unwrap(),
            )
            .await
        }));
    }
    for h in handles {
        assert!(matches!(h.await.unwrap(), Ok(ProcessResult::Completed(_))));
    }

    let user = get_user(&*store, "U_multi").await;
    assert_eq!(user.enrolled_courses.len(), courses.len());
    for course in courses {
        let course_id = enrollment_sync::domain::id::CourseId::new(course).unwrap();
        assert!(user.is_enrolled_in(&course_id), "missing {course}");
        let course = get_course(&*store, course).await;
        assert_eq!(course.enrolled_students.len(), 1);
        assert!(course.has_student(&enrollment_sync::domain::id::UserId::new("U_multi").unwrap()));
    }
}

// ── racing outcomes ────────────────────────────────────────────────────────
// Succeeded and failed for the same purchase arrive together. Whichever runs
// first wins; the other is refused and logged.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_succeeded_and_failed_apply_exactly_one() {
    let store = Arc::new(InMemoryStore::new());
    let sessions = Arc::new(FakeCheckoutSessions::new());
    seed_checkout(&*store, &sessions, "pi_race", "P_race", "U_race", "C_race", PurchaseStatus::Pending).await;
    let lc = Arc::new(lifecycle(store.clone(), sessions.clone()));

    let succeeded = {
        let lc = Arc::clone(&lc);
        tokio::spawn(async move {
            lc.on_payment_succeeded(
                &EventId::new("evt_race_ok").unwrap(),
                &PaymentIntentId::new("pi_race").unwrap(),
            )
            .await
            .unwrap()
        })
    };
    let failed = {
        let lc = Arc::clone(&lc);
        tokio::spawn(async move {
            lc.on_payment_failed(
                &EventId::new("evt_race_fail").unwrap(),
                &PaymentIntentId::new("pi_race").unwrap(),
            )
            .await
            .unwrap()
        })
    };

    let results = [succeeded.await.unwrap(), failed.await.unwrap()];
    let transitions = results
        .iter()
        .filter(|r| matches!(r, ProcessResult::Completed(_) | ProcessResult::Failed(_)))
        .count();
    let anomalies = results
        .iter()
        .filter(|r| matches!(r, ProcessResult::Anomaly { .. }))
        .count();
    assert_eq!(transitions, 1);
    assert_eq!(anomalies, 1);
    assert_eq!(store.anomalies().await.len(), 1);

    let purchase = get_purchase(&*store, "P_race").await;
    let enrolled = get_user(&*store, "U_race").await.enrolled_courses.len();
    match purchase.status {
        PurchaseStatus::Completed => assert_eq!(enrolled, 1),
        PurchaseStatus::Failed => assert_eq!(enrolled, 0),
        PurchaseStatus::Pending => panic!("purchase left pending"),
    }
}
