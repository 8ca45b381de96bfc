pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// Number of hex characters kept from `sha256(public_key)` to form an address.
pub const ADDRESS_HEX_LEN: usize = 32;
pub const BLOCK_CAPACITY: usize = 10;
/// 2021-10-10T00:00:00Z in milliseconds.
pub const GENESIS_TIMESTAMP_MS: u64 = 1_633_824_000_000;
/// Zero disables mining on seal.
pub const DEFAULT_DIFFICULTY: u32 = 0;
