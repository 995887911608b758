pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// `previousHash` of block 1.
pub const GENESIS_PREVIOUS_HASH: &str = "0x00";
pub const DEFAULT_DIFFICULTY: usize = 2;
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 5;
pub const DEFAULT_TICK_MS: u64 = 1;
pub const DEFAULT_ATTEMPTS_PER_TICK: u64 = 1;
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
