//! Cross-thread blocking behavior: stop/reset/clear interacting with
//! callers blocked in `send` and `receive`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ipc_queue::{MessageQueue, Permissions};
use uuid::Uuid;

fn unique_name(tag: &str) -> String {
    format!("itest_{}_{}", tag, Uuid::new_v4().simple())
}

fn shared_queue(tag: &str, capacity: u32, message_size: u32) -> Arc<MessageQueue> {
    let mut q = MessageQueue::new();
    q.create(&unique_name(tag), capacity, message_size, Permissions::default())
        .expect("create queue");
    Arc::new(q)
}

/// Upper bound we allow between a `stop()` and the blocked call returning.
const WAKE_BUDGET: Duration = Duration::from_secs(2);

#[test]
fn stop_wakes_a_sender_blocked_on_a_full_queue() {
    let q = shared_queue("stop_send", 1, 8);
    assert!(q.try_send(b"filler").unwrap());

    let sender = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            let started = Instant::now();
            let sent = q.send(b"blocked").expect("send survives stop");
            (sent, started.elapsed())
        })
    };

    // Give the sender time to actually block on the full queue.
    thread::sleep(Duration::from_millis(100));
    q.stop().unwrap();

    let (sent, elapsed) = sender.join().unwrap();
    assert!(!sent, "a stop-wake must report the interrupted outcome");
    assert!(
        elapsed < WAKE_BUDGET,
        "blocked sender took {elapsed:?} to wake"
    );
    // No slot ever freed up: the filler message is still the only one.
    let mut buf = [0u8; 8];
    assert_eq!(q.try_receive(&mut buf).unwrap(), Some(6));
    assert_eq!(&buf[..6], b"filler");
    assert_eq!(q.try_receive(&mut buf).unwrap(), None);
}

#[test]
fn stop_wakes_a_receiver_blocked_on_an_empty_queue() {
    let q = shared_queue("stop_recv", 2, 8);

    let receiver = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            let mut buf = [0u8; 8];
            let started = Instant::now();
            let outcome = q.receive(&mut buf).expect("receive survives stop");
            (outcome, started.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(100));
    q.stop().unwrap();

    let (outcome, elapsed) = receiver.join().unwrap();
    assert_eq!(outcome, None, "a stop-wake must report the interrupted outcome");
    assert!(
        elapsed < WAKE_BUDGET,
        "blocked receiver took {elapsed:?} to wake"
    );
}

#[test]
fn stop_broadcast_reaches_every_blocked_caller() {
    let q = shared_queue("broadcast", 1, 8);
    assert!(q.try_send(b"filler").unwrap());

    let mut blocked = Vec::new();
    for _ in 0..4 {
        let q = Arc::clone(&q);
        blocked.push(thread::spawn(move || q.send(b"waiting").unwrap()));
    }
    for _ in 0..4 {
        let q = Arc::clone(&q);
        blocked.push(thread::spawn(move || {
            let mut buf = [0u8; 8];
            // The queue holds one message; at most one of these receivers
            // gets it, the rest block until the stop.
            q.receive(&mut buf).unwrap();
            false
        }));
    }

    thread::sleep(Duration::from_millis(150));
    q.stop().unwrap();

    let deadline = Instant::now() + WAKE_BUDGET;
    for handle in blocked {
        assert!(
            Instant::now() < deadline,
            "not every blocked caller woke within the budget"
        );
        // Senders must all report interrupted; receivers may have consumed
        // the one message before the stop.
        let _ = handle.join().unwrap();
    }
}

#[test]
fn reset_restores_blocking_after_a_stop() {
    let q = shared_queue("reset", 2, 16);

    q.stop().unwrap();
    // Stopped and empty: the blocking receive returns immediately.
    let mut buf = [0u8; 16];
    assert_eq!(q.receive(&mut buf).unwrap(), None);

    q.reset().unwrap();

    let got_message = Arc::new(AtomicBool::new(false));
    let receiver = {
        let q = Arc::clone(&q);
        let got_message = Arc::clone(&got_message);
        thread::spawn(move || {
            let mut buf = [0u8; 16];
            let outcome = q.receive(&mut buf).unwrap();
            got_message.store(outcome.is_some(), Ordering::SeqCst);
            outcome.map(|len| buf[..len].to_vec())
        })
    };

    // After the reset the receiver must wait rather than return None.
    thread::sleep(Duration::from_millis(200));
    assert!(
        !got_message.load(Ordering::SeqCst) && !receiver.is_finished(),
        "a post-reset blocking receive returned without data"
    );

    assert!(q.send(b"fresh data").unwrap());
    let received = receiver.join().unwrap();
    assert_eq!(received.as_deref(), Some(&b"fresh data"[..]));
}

#[test]
fn clear_unblocks_a_sender_waiting_for_space() {
    let q = shared_queue("clear", 2, 8);
    assert!(q.try_send(b"a").unwrap());
    assert!(q.try_send(b"b").unwrap());

    let sender = {
        let q = Arc::clone(&q);
        thread::spawn(move || q.send(b"c").unwrap())
    };

    thread::sleep(Duration::from_millis(100));
    q.clear().unwrap();

    // The cleared queue has room, so the blocked send completes normally.
    assert!(sender.join().unwrap());

    // Only the post-clear message is left.
    let mut buf = [0u8; 8];
    assert_eq!(q.try_receive(&mut buf).unwrap(), Some(1));
    assert_eq!(&buf[..1], b"c");
    assert_eq!(q.try_receive(&mut buf).unwrap(), None);
}

#[test]
fn send_wakes_a_blocked_receiver() {
    let q = shared_queue("handoff", 4, 32);

    let receiver = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            let mut buf = [0u8; 32];
            let len = q.receive(&mut buf).unwrap().expect("woken by a send");
            buf[..len].to_vec()
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(q.send(b"wake up").unwrap());
    assert_eq!(receiver.join().unwrap(), b"wake up");
}

#[test]
fn fifo_order_holds_across_threads() {
    let q = shared_queue("fifo_threads", 4, 8);
    const MESSAGES: u32 = 2_000;

    let producer = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            for i in 0..MESSAGES {
                assert!(q.send(&i.to_le_bytes()).unwrap());
            }
        })
    };

    let consumer = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            let mut buf = [0u8; 8];
            for expected in 0..MESSAGES {
                let len = q.receive(&mut buf).unwrap().expect("producer never stops");
                assert_eq!(len, 4);
                let got = u32::from_le_bytes(buf[..4].try_into().unwrap());
                assert_eq!(got, expected, "messages arrived out of order");
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();
}
