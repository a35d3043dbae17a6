pub mod codec;
pub mod config;
pub mod pack;
pub mod pool_json;
pub mod sleep;
pub mod state;

pub use codec::{atoi, parse_size, parse_users, print_users};
pub use config::{clear_config, find_config_path, parse_config, BbConfig, GresLimit};
pub use pack::{pack_bufs, pack_state, unpack_bufs, unpack_state, PackedAlloc};
pub use pool_json::{parse_pools, PoolEntry};
pub use sleep::{InterruptibleSleep, WakeReason};
pub use state::{AllocRecord, AllocState, BbState, GresUsage, JobLookup, NoJobLimits, UserRecord, BB_HASH_SIZE, NICE_OFFSET, NO_VAL};
