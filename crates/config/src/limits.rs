//! Protocol defaults shared across the sync core.

use std::time::Duration;

/// Interval between sync cycles.
pub const SYNC_CYCLE: Duration = Duration::from_secs(5);

/// Deadline for every outstanding peer request.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of blocks requested or served in one message.
pub const MAX_BLOCKS_PER_MSG: u64 = 128;

/// Maximum number of headers requested or served in one message.
pub const MAX_BLOCK_HEADERS_PER_MSG: u64 = 2048;

/// Number of dense (step 1) entries at the front of a block locator before
/// the step starts doubling.
pub const BLOCK_LOCATOR_DENSE_PREFIX: usize = 9;

/// Capacity of the single-block reply mailbox.
pub const BLOCK_MAILBOX_CAPACITY: usize = 1024;
/// Capacity of the multi-block reply mailbox.
pub const BLOCKS_MAILBOX_CAPACITY: usize = 128;
/// Capacity of the headers reply mailbox.
pub const HEADERS_MAILBOX_CAPACITY: usize = 1024;
/// Capacity of the merkle-block reply mailbox.
pub const MERKLE_BLOCKS_MAILBOX_CAPACITY: usize = 128;
