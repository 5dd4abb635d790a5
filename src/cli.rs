use clap::{Parser, Subcommand};

use crate::defaults;

/// ipc-queue - create, inspect and exercise shared-memory message queues
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,

    /// Verbose output (debug-level logging)
    #[clap(short = 'v', long, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Operations on a named queue
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a queue and keep it alive until interrupted
    Create {
        /// Queue name (an identifier-like token)
        name: String,

        /// Maximum number of queued messages
        #[clap(short = 'c', long, default_value_t = defaults::MAX_QUEUE_SIZE)]
        capacity: u32,

        /// Maximum size in bytes of a single message
        #[clap(short = 's', long, default_value_t = defaults::MAX_MESSAGE_SIZE)]
        message_size: u32,

        /// Permission bits for the backing object, octal (e.g. 660)
        #[clap(long, value_parser = parse_mode)]
        mode: Option<u32>,
    },

    /// Send one message per argument, oldest first
    Send {
        /// Queue name
        name: String,

        /// Message payloads
        #[clap(required = true)]
        messages: Vec<String>,

        /// Capacity used if the queue has to be created
        #[clap(short = 'c', long, default_value_t = defaults::MAX_QUEUE_SIZE)]
        capacity: u32,

        /// Message size limit used if the queue has to be created
        #[clap(short = 's', long, default_value_t = defaults::MAX_MESSAGE_SIZE)]
        message_size: u32,

        /// Fail fast instead of waiting when the queue is full
        #[clap(long, default_value_t = false)]
        non_blocking: bool,
    },

    /// Receive messages and print them to stdout
    Recv {
        /// Queue name
        name: String,

        /// Stop after this many messages (default: until interrupted)
        #[clap(short = 'n', long)]
        count: Option<u64>,

        /// Drain what is queued right now instead of waiting
        #[clap(long, default_value_t = false)]
        non_blocking: bool,
    },

    /// Print the queue's parameters
    Info {
        /// Queue name
        name: String,
    },

    /// Discard every queued message
    Clear {
        /// Queue name
        name: String,
    },

    /// Wake all blocked senders/receivers and disable waiting
    Stop {
        /// Queue name
        name: String,
    },

    /// Re-enable waiting after a stop
    Reset {
        /// Queue name
        name: String,
    },
}

/// Parses octal permission bits, with or without a `0o` prefix.
fn parse_mode(input: &str) -> Result<u32, String> {
    let digits = input.trim_start_matches("0o");
    u32::from_str_radix(digits, 8)
        .map_err(|_| format!("'{input}' is not an octal mode (try e.g. 660)"))
}
