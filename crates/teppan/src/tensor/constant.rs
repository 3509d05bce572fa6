/// # Constants with reserved meanings in teppan

/// In every batch buffer, teppan reserves the `0th` dimension for batching
pub const BATCH_DIM: usize = 0;

/// In every batch buffer, teppan reserves the `1st` dimension for frames
pub const FRAME_DIM: usize = 1;

/// Width in bytes of one fixed point value as the hardware counts it
pub const BYTES_PER_VALUE: usize = std::mem::size_of::<i16>();
