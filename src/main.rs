//! # ipc-queue binary
//!
//! A small command-line companion to the `ipc_queue` library: it creates,
//! inspects and exercises named shared-memory message queues so two shells
//! (or scripts) can talk to each other without writing any code.
//!
//! Typical session:
//!
//! ```text
//! shell-1$ ipc-queue create chat --capacity 8 --message-size 256
//! shell-2$ ipc-queue recv chat
//! shell-3$ ipc-queue send chat "hello over shared memory"
//! ```
//!
//! `RUST_LOG` overrides the log filter; `--verbose` is a shorthand for
//! debug-level output.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use ipc_queue::cli::{Args, Command};
use ipc_queue::logging::ColorizedFormatter;
use ipc_queue::{MessageQueue, Permissions};

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; --verbose raises the default to debug.
    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .event_format(ColorizedFormatter)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match args.command {
        Command::Create {
            name,
            capacity,
            message_size,
            mode,
        } => run_create(&name, capacity, message_size, mode),
        Command::Send {
            name,
            messages,
            capacity,
            message_size,
            non_blocking,
        } => run_send(&name, &messages, capacity, message_size, non_blocking),
        Command::Recv {
            name,
            count,
            non_blocking,
        } => run_recv(&name, count, non_blocking),
        Command::Info { name } => run_info(&name),
        Command::Clear { name } => {
            let q = open(&name)?;
            q.clear()?;
            info!("cleared '{}'", name);
            Ok(())
        }
        Command::Stop { name } => {
            let q = open(&name)?;
            q.stop()?;
            info!("stopped '{}': blocked senders and receivers are waking up", name);
            Ok(())
        }
        Command::Reset { name } => {
            let q = open(&name)?;
            q.reset()?;
            info!("reset '{}': blocking calls may wait again", name);
            Ok(())
        }
    }
}

fn open(name: &str) -> Result<MessageQueue> {
    let mut q = MessageQueue::new();
    q.open(name)
        .with_context(|| format!("opening message queue '{name}'"))?;
    Ok(q)
}

fn permissions(mode: Option<u32>) -> Permissions {
    match mode {
        Some(bits) => Permissions::from_mode(bits as libc::mode_t),
        None => Permissions::default(),
    }
}

/// Creates the queue and parks until SIGINT/SIGTERM so the region stays
/// alive while other processes come and go.
fn run_create(name: &str, capacity: u32, message_size: u32, mode: Option<u32>) -> Result<()> {
    let mut q = MessageQueue::new();
    q.create(name, capacity, message_size, permissions(mode))
        .with_context(|| format!("creating message queue '{name}'"))?;
    info!(
        "created '{}' (capacity {}, max message size {} bytes)",
        name, capacity, message_size
    );
    info!("holding the queue open; press Ctrl-C to release it");

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&term))
        .context("installing SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&term))
        .context("installing SIGTERM handler")?;

    while !term.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    // Let peers blocked in send/receive out before the handle drops.
    if let Err(err) = q.stop() {
        warn!("stop on shutdown failed: {}", err);
    }
    info!("releasing '{}'", name);
    Ok(())
}

fn run_send(
    name: &str,
    messages: &[String],
    capacity: u32,
    message_size: u32,
    non_blocking: bool,
) -> Result<()> {
    let mut q = MessageQueue::new();
    q.open_or_create(name, capacity, message_size, Permissions::default())
        .with_context(|| format!("attaching to message queue '{name}'"))?;

    for message in messages {
        let sent = if non_blocking {
            q.try_send(message.as_bytes())?
        } else {
            q.send(message.as_bytes())?
        };
        if sent {
            info!("sent {} bytes to '{}'", message.len(), name);
        } else if non_blocking {
            warn!("'{}' is full, message not sent", name);
        } else {
            warn!("send to '{}' was interrupted by stop()", name);
            break;
        }
    }
    Ok(())
}

fn run_recv(name: &str, count: Option<u64>, non_blocking: bool) -> Result<()> {
    let q = open(name)?;
    let mut buf = vec![0u8; q.max_message_size() as usize];
    let stdout = std::io::stdout();
    let mut received = 0u64;

    while count.map_or(true, |limit| received < limit) {
        let outcome = if non_blocking {
            q.try_receive(&mut buf)?
        } else {
            q.receive(&mut buf)?
        };
        match outcome {
            Some(len) => {
                let mut out = stdout.lock();
                out.write_all(&buf[..len])?;
                out.write_all(b"\n")?;
                out.flush()?;
                received += 1;
            }
            None if non_blocking => {
                info!("'{}' is empty", name);
                break;
            }
            None => {
                info!("receive on '{}' was interrupted by stop()", name);
                break;
            }
        }
    }
    info!("received {} message(s)", received);
    Ok(())
}

fn run_info(name: &str) -> Result<()> {
    let q = open(name)?;
    println!("name:             {}", q.name());
    println!("max queue size:   {}", q.max_queue_size());
    println!("max message size: {} bytes", q.max_message_size());
    Ok(())
}
