mod common;

use std::collections::HashSet;

use taskq::storage::TaskId;

const TASKS: u64 = 300;
const WORKERS: usize = 12;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gets_never_share_a_task() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;

    for i in 0..TASKS {
        server.client.add("work", &format!("job-{i}")).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..WORKERS {
        let client = server.client.clone();
        handles.push(tokio::spawn(async move {
            let mut leased = Vec::new();
            while let Some(task) = client.get("work").await.unwrap() {
                assert_eq!(task.payload, format!("job-{}", task.id));
                leased.push(task.id);
            }
            leased
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "task {id} leased twice");
        }
    }
    assert_eq!(seen, (0..TASKS).collect::<HashSet<TaskId>>());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_get_unique_ids() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;

    let mut handles = Vec::new();
    for producer in 0..WORKERS {
        let client = server.client.clone();
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for n in 0..25 {
                ids.push(client.add("shared", &format!("{producer}-{n}")).await.unwrap());
            }
            ids
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let produced = handle.await.unwrap();
        // Each producer observes strictly increasing ids.
        assert!(produced.windows(2).all(|w| w[0] < w[1]));
        ids.extend(produced);
    }
    ids.sort_unstable();
    let expected: Vec<TaskId> = (0..(WORKERS as u64 * 25)).collect();
    assert_eq!(ids, expected);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acks_succeed_once() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;

    server.client.add("q", "only").await.unwrap();
    server.client.get("q").await.unwrap().unwrap();

    let mut handles = Vec::new();
    for _ in 0..WORKERS {
        let client = server.client.clone();
        handles.push(tokio::spawn(async move { client.ack("q", 0).await.unwrap() }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_save_during_traffic_is_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let server = common::start(dir.path(), 300).await;

    let producer = {
        let client = server.client.clone();
        tokio::spawn(async move {
            for n in 0..100 {
                client.add("busy", &format!("{n}")).await.unwrap();
            }
        })
    };
    for _ in 0..5 {
        server.client.save().await.unwrap();
    }
    producer.await.unwrap();

    // Every saved queue must be internally consistent and reload cleanly.
    let snapshot = server.state.checkpoint.load().await.unwrap().unwrap();
    if let Some(queue) = snapshot.queues.get("busy") {
        assert_eq!(queue.tasks.len() as u64, queue.next_id);
        assert!(queue.tasks.iter().enumerate().all(|(i, t)| t.id == i as u64));
    }

    server.stop().await;
}
