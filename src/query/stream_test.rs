use crate::cluster::{Communicator, LocalFabric, Tag};
use crate::query::buffer::DoubleBuffer;
use crate::query::errors::QueryError;
use crate::query::stream::{RecordLimit, RecordSender, receive_records, send_terminator};
use bytes::Bytes;
use std::sync::Arc;
use tokio::runtime::Handle;

fn fabric(size: usize) -> Vec<Arc<dyn Communicator>> {
    LocalFabric::build(size)
        .into_iter()
        .map(|c| Arc::new(c) as Arc<dyn Communicator>)
        .collect()
}

fn record(source: usize, seq: u32) -> Vec<u8> {
    let mut bytes = vec![source as u8];
    bytes.extend_from_slice(&seq.to_le_bytes());
    bytes
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn records_arrive_in_per_source_order_across_buffers() {
    let comms = fabric(4);
    let per_worker = 500u32;

    for comm in comms.iter().skip(1).cloned() {
        let runtime = Handle::current();
        tokio::task::spawn_blocking(move || {
            let rank = comm.rank();
            // Tiny buffers force many messages per worker.
            let mut sender = RecordSender::with_buffers(
                runtime.clone(),
                Arc::clone(&comm),
                0,
                Tag::List,
                DoubleBuffer::with_capacity(64),
            );
            for seq in 0..per_worker {
                sender.push_blocking(&record(rank, seq)).unwrap();
            }
            assert!(sender.messages_sent() > 1);
            sender.finish_blocking().unwrap();
            runtime
                .block_on(send_terminator(comm.as_ref(), 0, Tag::List))
                .unwrap();
        });
    }

    let mut next_seq = vec![0u32; 4];
    let stats = receive_records(&comms[0], Tag::List, 3, |raw| {
        let source = raw[0] as usize;
        let seq = u32::from_le_bytes([raw[1], raw[2], raw[3], raw[4]]);
        assert_eq!(seq, next_seq[source], "source {source} out of order");
        next_seq[source] += 1;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(stats.records, 3 * per_worker as u64);
    assert_eq!(stats.terminators, 3);
    assert_eq!(&next_seq[1..], &[per_worker; 3]);
}

#[tokio::test]
async fn loop_ends_after_one_terminator_per_source() {
    let comms = fabric(3);
    for rank in 1..3 {
        for _ in 0..rank {
            let mut framed = Vec::new();
            framed.extend_from_slice(&1u32.to_le_bytes());
            framed.push(rank as u8);
            comms[rank]
                .send(0, Tag::Aggregate, Bytes::from(framed))
                .await
                .unwrap();
        }
        send_terminator(comms[rank].as_ref(), 0, Tag::Aggregate)
            .await
            .unwrap();
    }
    // Traffic on another tag is left alone.
    comms[1].send(0, Tag::Sort, Bytes::new()).await.unwrap();

    let mut seen = Vec::new();
    let stats = receive_records(&comms[0], Tag::Aggregate, 2, |raw| {
        seen.push(raw[0]);
        Ok(())
    })
    .await
    .unwrap();
    seen.sort();
    assert_eq!(seen, vec![1, 2, 2]);
    assert_eq!(stats.terminators, 2);
    assert_eq!(stats.messages, 3);
    assert!(comms[0].recv(Tag::Sort, Some(1)).await.is_ok());
}

#[tokio::test]
async fn duplicate_terminator_is_a_channel_error() {
    let comms = fabric(3);
    send_terminator(comms[1].as_ref(), 0, Tag::List).await.unwrap();
    send_terminator(comms[1].as_ref(), 0, Tag::List).await.unwrap();

    let err = receive_records(&comms[0], Tag::List, 2, |_| Ok(()))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Channel(_)));
}

#[tokio::test]
async fn callback_failure_stops_the_loop() {
    let comms = fabric(2);
    let mut framed = Vec::new();
    framed.extend_from_slice(&2u32.to_le_bytes());
    framed.extend_from_slice(b"ok");
    comms[1]
        .send(0, Tag::Sort, Bytes::from(framed))
        .await
        .unwrap();

    let err = receive_records(&comms[0], Tag::Sort, 1, |_| {
        Err(QueryError::Resource("sink full".to_string()))
    })
    .await
    .unwrap_err();
    assert!(matches!(err, QueryError::Resource(_)));
}

#[tokio::test]
async fn zero_sources_returns_immediately() {
    let comms = fabric(1);
    let stats = receive_records(&comms[0], Tag::List, 0, |_| Ok(()))
        .await
        .unwrap();
    assert_eq!(stats.terminators, 0);
}

#[test]
fn record_limit_trips_once_flushed_count_reaches_limit() {
    let limit = RecordLimit::new(10);
    assert!(!limit.is_reached());
    assert!(!limit.record_flush(4));
    assert!(limit.record_flush(6));
    assert!(limit.is_reached());
    assert_eq!(limit.flushed(), 10);

    let unlimited = RecordLimit::new(0);
    assert!(!unlimited.record_flush(u64::MAX));
    assert!(!unlimited.is_reached());
}

#[tokio::test]
async fn dropped_sender_completes_its_inflight_send() {
    let comms = fabric(2);
    let mut sender = RecordSender::with_buffers(
        Handle::current(),
        Arc::clone(&comms[1]),
        0,
        Tag::Sort,
        DoubleBuffer::with_capacity(16),
    );
    assert_eq!(sender.push(&[7u8; 10]).await.unwrap(), 0);
    // The second record does not fit, so the first buffer goes out.
    assert_eq!(sender.push(&[8u8; 10]).await.unwrap(), 1);
    drop(sender);

    let msg = comms[0]
        .recv_timeout(Tag::Sort, Some(1), Some(std::time::Duration::from_secs(2)))
        .await
        .unwrap();
    let frames: Vec<_> = crate::query::buffer::FrameIter::new(&msg.payload)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(frames, vec![&[7u8; 10][..]]);
}
