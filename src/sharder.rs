//! Deterministic bucketing for weighted variant splits.

pub(crate) trait Sharder {
    fn get_shard(&self, input: &str, total_shards: u64) -> u64;
}

/// Buckets by the first four bytes of the MD5 digest, read big-endian.
pub(crate) struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn get_shard(&self, input: &str, total_shards: u64) -> u64 {
        let hash = md5::compute(input);
        let value = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
        u64::from(value) % total_shards
    }
}
