
use vlog::ValueLocator;

/// Live locator whose offset is derived from the key.
pub(crate) fn live(key: u64, len: u32) -> ValueLocator {
    ValueLocator::new(key, key * 100, len)
}

pub(crate) fn tomb(key: u64) -> ValueLocator {
    ValueLocator::new(key, 0, 0)
}
