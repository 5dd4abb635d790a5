//! Attachment counting and region lifetime across multiple handles.

use ipc_queue::{Error, MessageQueue, Permissions};
use uuid::Uuid;

fn unique_name(tag: &str) -> String {
    format!("ltest_{}_{}", tag, Uuid::new_v4().simple())
}

#[test]
fn closing_a_non_last_handle_keeps_the_region() {
    let name = unique_name("keep");

    let mut creator = MessageQueue::new();
    creator
        .create(&name, 4, 32, Permissions::default())
        .unwrap();
    assert!(creator.try_send(b"survives").unwrap());

    let mut second = MessageQueue::new();
    second.open(&name).unwrap();

    // The creator leaves; the region and its contents stay for the second
    // handle.
    creator.close();

    let mut buf = [0u8; 32];
    assert_eq!(second.try_receive(&mut buf).unwrap(), Some(8));
    assert_eq!(&buf[..8], b"survives");

    // And a fresh attachment still works.
    let mut third = MessageQueue::new();
    third.open(&name).unwrap();
    assert_eq!(third.max_queue_size(), 4);
}

#[test]
fn closing_the_last_handle_destroys_the_region() {
    let name = unique_name("destroy");

    let mut creator = MessageQueue::new();
    creator
        .create(&name, 2, 16, Permissions::default())
        .unwrap();
    let mut second = MessageQueue::new();
    second.open(&name).unwrap();

    creator.close();
    second.close();

    let mut reopened = MessageQueue::new();
    assert!(
        matches!(reopened.open(&name), Err(Error::NotFound { .. })),
        "the region must be gone after the last close"
    );

    // The name is free again for a brand-new queue.
    reopened
        .create(&name, 8, 64, Permissions::default())
        .unwrap();
    assert_eq!(reopened.max_queue_size(), 8);
    assert_eq!(reopened.max_message_size(), 64);
}

#[test]
fn dropping_a_handle_counts_as_closing_it() {
    let name = unique_name("drop");

    {
        let mut q = MessageQueue::new();
        q.create(&name, 2, 16, Permissions::default()).unwrap();
    }

    let mut reopened = MessageQueue::new();
    assert!(matches!(
        reopened.open(&name),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn open_or_create_reports_the_existing_parameters() {
    let name = unique_name("discover");

    let mut creator = MessageQueue::new();
    creator.create(&name, 2, 4, Permissions::default()).unwrap();

    // A second attachment asking for wildly different parameters must
    // discover the creator's values instead.
    let mut second = MessageQueue::new();
    second
        .open_or_create(&name, 99, 99, Permissions::default())
        .unwrap();
    assert_eq!(second.max_queue_size(), 2);
    assert_eq!(second.max_message_size(), 4);

    // The discovered limit is enforced, not the requested one.
    assert!(matches!(
        second.try_send(&[0u8; 99]),
        Err(Error::MessageTooLarge { .. })
    ));
}

#[test]
fn create_only_refuses_an_existing_name() {
    let name = unique_name("exclusive");

    let mut first = MessageQueue::new();
    first.create(&name, 2, 16, Permissions::default()).unwrap();

    let mut second = MessageQueue::new();
    assert!(matches!(
        second.create(&name, 2, 16, Permissions::default()),
        Err(Error::AlreadyExists { .. })
    ));
    assert!(!second.is_open());
}

#[test]
fn open_only_refuses_a_missing_name() {
    let mut q = MessageQueue::new();
    assert!(matches!(
        q.open(&unique_name("missing")),
        Err(Error::NotFound { .. })
    ));
    assert!(!q.is_open());
}

#[test]
fn invalid_names_are_rejected_before_touching_the_backend() {
    let mut q = MessageQueue::new();
    for bad in ["", "1queue", "no-dashes", "no spaces", "no/slash"] {
        assert!(
            matches!(
                q.create(bad, 2, 16, Permissions::default()),
                Err(Error::InvalidName { .. })
            ),
            "expected '{bad}' to be rejected"
        );
        assert!(!q.is_open());
    }
}

#[test]
fn two_handles_share_one_queue_state() {
    let name = unique_name("shared");

    let mut a = MessageQueue::new();
    a.create(&name, 2, 8, Permissions::default()).unwrap();
    let mut b = MessageQueue::new();
    b.open(&name).unwrap();

    // A send through one handle is visible through the other, and the
    // capacity bound is shared too.
    assert!(a.try_send(b"one").unwrap());
    assert!(b.try_send(b"two").unwrap());
    assert!(!a.try_send(b"three").unwrap());

    let mut buf = [0u8; 8];
    assert_eq!(b.try_receive(&mut buf).unwrap(), Some(3));
    assert_eq!(&buf[..3], b"one");

    // stop() through one handle is observed by the other.
    b.stop().unwrap();
    assert_eq!(a.receive(&mut buf).unwrap(), Some(3), "data drains even when stopped");
    assert_eq!(&buf[..3], b"two");
    assert_eq!(a.receive(&mut buf).unwrap(), None, "empty and stopped: interrupted");
    a.reset().unwrap();
}
