use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::sync::error::SyncError;
use crate::sync::lifecycle::{CommitHook, Outcome, RequestKey, RequestLifecycle, Supersession};

fn gated(value: u32) -> (oneshot::Sender<()>, impl Future<Output = Result<u32, SyncError>>) {
    let (release, gate) = oneshot::channel::<()>();
    let work = async move {
        let _ = gate.await;
        Ok(value)
    };
    (release, work)
}

fn recorder(log: &Arc<Mutex<Vec<u32>>>) -> CommitHook<u32> {
    let log = Arc::clone(log);
    Box::new(move |result: &Result<u32, SyncError>| {
        if let Ok(value) = result {
            log.lock().expect("log mutex poisoned").push(*value);
        }
    })
}

async fn wait_until_settled<T>(lifecycle: &RequestLifecycle<T>, key: &RequestKey)
where
    T: Clone + Send + Sync + 'static,
{
    for _ in 0..200 {
        if !lifecycle.is_pending(key) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("request {key} never settled");
}

#[tokio::test]
async fn concurrent_executes_share_one_invocation() {
    let lifecycle = RequestLifecycle::<u32>::default();
    let key = RequestKey::new("fetchJobs", "all");
    let calls = Arc::new(AtomicUsize::new(0));
    let (release, work) = gated(7);

    let first = {
        let calls = Arc::clone(&calls);
        lifecycle.execute(key.clone(), move || {
            calls.fetch_add(1, Ordering::SeqCst);
            work
        })
    };
    let second = {
        let calls = Arc::clone(&calls);
        lifecycle.execute(key.clone(), move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(8) }
        })
    };

    assert!(lifecycle.is_pending(&key));
    assert_eq!(lifecycle.outcome(&key), Outcome::Pending);
    release.send(()).expect("gate open");

    assert_eq!(first.await, Ok(7));
    assert_eq!(second.await, Ok(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(lifecycle.outcome(&key), Outcome::Fulfilled(7));
}

#[tokio::test]
async fn distinct_keys_run_independently() {
    let lifecycle = RequestLifecycle::<u32>::default();
    let jobs = lifecycle.execute(RequestKey::new("fetchJobs", "search=rust"), || async { Ok(1) });
    let other = lifecycle.execute(RequestKey::new("fetchJobs", "search=go"), || async { Ok(2) });

    assert_eq!(jobs.await, Ok(1));
    assert_eq!(other.await, Ok(2));
    assert_eq!(
        lifecycle.outcome(&RequestKey::new("fetchJobs", "never")),
        Outcome::Idle
    );
}

#[tokio::test]
async fn stale_response_is_discarded_under_latest_issued() {
    let lifecycle = RequestLifecycle::<u32>::new(Supersession::LatestIssued);
    let key = RequestKey::new("fetchJobs", "all");
    let committed = Arc::new(Mutex::new(Vec::new()));

    let (release_old, old_work) = gated(1);
    let (release_new, new_work) = gated(2);
    let old = lifecycle.execute_with(key.clone(), move || old_work, recorder(&committed));
    let new = lifecycle.reissue(key.clone(), move || new_work, Some(recorder(&committed)));

    release_new.send(()).expect("gate open");
    assert_eq!(new.await, Ok(2));
    release_old.send(()).expect("gate open");
    assert_eq!(old.await, Ok(1), "the stale caller still gets its own response");

    assert_eq!(lifecycle.outcome(&key), Outcome::Fulfilled(2));
    assert_eq!(*committed.lock().expect("log mutex poisoned"), vec![2]);
}

#[tokio::test]
async fn latest_finished_settles_every_arrival() {
    let lifecycle = RequestLifecycle::<u32>::new(Supersession::LatestFinished);
    let key = RequestKey::new("fetchJobs", "all");
    let committed = Arc::new(Mutex::new(Vec::new()));

    let (release_old, old_work) = gated(1);
    let (release_new, new_work) = gated(2);
    let old = lifecycle.execute_with(key.clone(), move || old_work, recorder(&committed));
    let new = lifecycle.reissue(key.clone(), move || new_work, Some(recorder(&committed)));

    release_new.send(()).expect("gate open");
    assert_eq!(new.await, Ok(2));
    release_old.send(()).expect("gate open");
    assert_eq!(old.await, Ok(1));

    assert_eq!(lifecycle.outcome(&key), Outcome::Fulfilled(1));
    assert_eq!(*committed.lock().expect("log mutex poisoned"), vec![2, 1]);
}

#[tokio::test]
async fn failures_settle_as_rejected() {
    let lifecycle = RequestLifecycle::<u32>::default();
    let key = RequestKey::new("fetchNotifications", "all");
    let result = lifecycle
        .execute(key.clone(), || async {
            Err(SyncError::NetworkUnavailable("offline".to_string()))
        })
        .await;

    assert_eq!(result, Err(SyncError::NetworkUnavailable("offline".to_string())));
    assert_eq!(
        lifecycle.outcome(&key),
        Outcome::Rejected(SyncError::NetworkUnavailable("offline".to_string()))
    );
    assert!(!lifecycle.is_pending(&key));
}

#[tokio::test]
async fn dropped_caller_does_not_cancel_the_request() {
    let lifecycle = RequestLifecycle::<u32>::default();
    let key = RequestKey::new("transition", "a-1");
    let committed = Arc::new(Mutex::new(Vec::new()));
    let (release, work) = gated(3);

    let handle = lifecycle.execute_with(key.clone(), move || work, recorder(&committed));
    drop(handle);
    release.send(()).expect("gate open");

    wait_until_settled(&lifecycle, &key).await;
    assert_eq!(lifecycle.outcome(&key), Outcome::Fulfilled(3));
    assert_eq!(*committed.lock().expect("log mutex poisoned"), vec![3]);
}

#[tokio::test]
async fn settled_key_issues_fresh_request() {
    let lifecycle = RequestLifecycle::<u32>::default();
    let key = RequestKey::new("fetchJobs", "all");
    let calls = Arc::new(AtomicUsize::new(0));

    for expected in 1..=2 {
        let calls = Arc::clone(&calls);
        let value = lifecycle
            .execute(key.clone(), move || {
                let n = calls.fetch_add(1, Ordering::SeqCst) as u32 + 1;
                async move { Ok(n) }
            })
            .await;
        assert_eq!(value, Ok(expected));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
