/// How many items fit in one atomic batch when each item costs
/// `writes_per_item` document writes. Never less than one.
pub fn chunk_size(batch_write_limit: usize, writes_per_item: usize) -> usize {
    (batch_write_limit / writes_per_item.max(1)).max(1)
}
