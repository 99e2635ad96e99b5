use crate::cluster::errors::ChannelError;
use crate::cluster::mailbox::Mailbox;
use crate::cluster::message::{Envelope, Tag};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

fn envelope(source: usize, tag: Tag, payload: &'static [u8]) -> Envelope {
    Envelope {
        source,
        tag,
        payload: Bytes::from_static(payload),
    }
}

#[tokio::test]
async fn take_filters_by_tag_and_source() {
    let mailbox = Mailbox::new();
    mailbox.deliver(envelope(1, Tag::List, b"a")).unwrap();
    mailbox.deliver(envelope(2, Tag::List, b"b")).unwrap();
    mailbox.deliver(envelope(2, Tag::Sort, b"c")).unwrap();

    let from_two = mailbox.take(Tag::List, Some(2)).await.unwrap();
    assert_eq!(from_two.payload.as_ref(), b"b");

    let sort = mailbox.take(Tag::Sort, None).await.unwrap();
    assert_eq!(sort.source, 2);

    let any = mailbox.take(Tag::List, None).await.unwrap();
    assert_eq!(any.payload.as_ref(), b"a");
    assert!(mailbox.try_take(Tag::List, None).is_none());
}

#[tokio::test]
async fn per_source_order_is_preserved() {
    let mailbox = Mailbox::new();
    for payload in [b"1", b"2", b"3"] {
        mailbox.deliver(envelope(4, Tag::Aggregate, payload)).unwrap();
    }
    for expected in [b"1", b"2", b"3"] {
        let got = mailbox.take(Tag::Aggregate, Some(4)).await.unwrap();
        assert_eq!(got.payload.as_ref(), expected);
    }
}

#[tokio::test]
async fn waiting_take_wakes_on_delivery() {
    let mailbox = Arc::new(Mailbox::new());
    let waiter = {
        let mailbox = Arc::clone(&mailbox);
        tokio::spawn(async move { mailbox.take(Tag::Progress, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    mailbox.deliver(envelope(3, Tag::Progress, b"")).unwrap();

    let got = waiter.await.unwrap().unwrap();
    assert!(got.is_terminator());
    assert_eq!(got.source, 3);
}

#[tokio::test]
async fn abort_fails_pending_and_future_operations() {
    let mailbox = Arc::new(Mailbox::new());
    let waiter = {
        let mailbox = Arc::clone(&mailbox);
        tokio::spawn(async move { mailbox.take(Tag::Broadcast, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    mailbox.abort(2);

    assert!(matches!(waiter.await.unwrap(), Err(ChannelError::Aborted(2))));
    assert!(matches!(
        mailbox.deliver(envelope(1, Tag::List, b"x")),
        Err(ChannelError::Aborted(2))
    ));
    assert!(mailbox.is_closed());
}
