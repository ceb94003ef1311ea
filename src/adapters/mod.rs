pub mod memory;
pub mod postgres_record_store;
pub mod redis_status_register;
pub mod redis_streams;

pub use postgres_record_store::PostgresRecordStore;
pub use redis_status_register::RedisStatusRegister;
pub use redis_streams::{RedisBroadcastLog, RedisEventLog};
