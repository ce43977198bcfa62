#![cfg(any(feature = "async-tokio", feature = "async-smol"))]

use gatherer::{GathererBuilder, RequestBuffer, RequestId, TimeUnit};
use std::time::Duration;

#[cfg(feature = "async-tokio")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tokio_scheduler_expires_partial_request() {
    use gatherer::TokioScheduler;
    use tokio::sync::mpsc;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let gatherer = GathererBuilder::<u64, _>::new()
        .handler(move |buffer: RequestBuffer<u64>| {
            let _ = tx.send(buffer.into_vec());
        })
        .num_parts(3)
        .timeout_duration(10)
        .unit(TimeUnit::Milliseconds)
        .build_with_scheduler(TokioScheduler::current())
        .unwrap();

    let complete = RequestId::new();
    for part in 0..3 {
        gatherer.receive(complete, part, part as u64).unwrap();
    }
    assert_eq!(rx.recv().await.unwrap(), vec![Some(0), Some(1), Some(2)]);

    gatherer.receive(RequestId::new(), 2, 9).unwrap();
    let expired = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(expired, vec![None, None, Some(9)]);

    // The completed request's timeout was cancelled.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(gatherer.in_flight(), 0);
}

#[cfg(feature = "async-smol")]
#[test]
fn smol_scheduler_expires_partial_request() {
    use gatherer::SmolScheduler;

    smol::block_on(async {
        let (tx, rx) = smol::channel::unbounded();
        let gatherer = GathererBuilder::<u64, _>::new()
            .handler(move |buffer: RequestBuffer<u64>| {
                let _ = tx.try_send(buffer.into_vec());
            })
            .num_parts(2)
            .timeout_duration(10)
            .build_with_scheduler(SmolScheduler)
            .unwrap();

        let id = RequestId::new();
        gatherer.receive(id, 0, 1).unwrap();
        assert_eq!(rx.recv().await.unwrap(), vec![Some(1), None]);
        assert_eq!(gatherer.in_flight(), 0);
    });
}
