//! Five jobs admitted back to back against a queue with two worker
//! permits: the first two run immediately, the rest queue in admission
//! order and their positions shift down as earlier jobs finish.

use raidlog_report_engine::job_queue::{JobQueue, JobState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[tokio::test]
async fn five_jobs_against_two_permits_drain_in_fifo_order() {
    let queue: JobQueue<u32> = JobQueue::new(2, Duration::from_secs(60), Duration::from_secs(60));
    let gates: Vec<Arc<Notify>> = (0..5).map(|_| Arc::new(Notify::new())).collect();

    let ids: Vec<_> = gates
        .iter()
        .enumerate()
        .map(|(i, gate)| {
            let gate = gate.clone();
            queue.submit(move |_cancel| async move {
                gate.notified().await;
                Ok(i as u32)
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(30)).await;

    // Two permits: jobs 0 and 1 run immediately (position 0), 2-4 queue.
    assert_eq!(queue.status(ids[0]).unwrap().state, JobState::Running);
    assert_eq!(queue.status(ids[0]).unwrap().queue_position, Some(0));
    assert_eq!(queue.status(ids[1]).unwrap().state, JobState::Running);
    assert_eq!(queue.status(ids[1]).unwrap().queue_position, Some(0));
    assert_eq!(queue.status(ids[2]).unwrap().queue_position, Some(1));
    assert_eq!(queue.status(ids[3]).unwrap().queue_position, Some(2));
    assert_eq!(queue.status(ids[4]).unwrap().queue_position, Some(3));

    gates[0].notify_one();
    for _ in 0..50 {
        if queue.status(ids[0]).map(|s| s.state) == Some(JobState::Completed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Job 2 took the freed permit; 3 and 4 each moved up one place.
    assert_eq!(queue.status(ids[2]).unwrap().state, JobState::Running);
    assert_eq!(queue.status(ids[3]).unwrap().queue_position, Some(1));
    assert_eq!(queue.status(ids[4]).unwrap().queue_position, Some(2));

    for gate in &gates[1..] {
        gate.notify_one();
    }
    for id in &ids {
        for _ in 0..100 {
            if matches!(
                queue.status(*id).map(|s| s.state),
                Some(JobState::Completed)
            ) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.status(*id).unwrap().state, JobState::Completed);
    }
}
