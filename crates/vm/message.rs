use bytes::Bytes;
use ethereum_types::U256;
use shardex_common::{Address, ShardRange};

/// A view into call data: the payload plus an offset/length window, so
/// nested calls can pass sub-slices without copying.
#[derive(Debug, Clone, Default)]
pub struct CallData {
    data: Bytes,
    offset: usize,
    size: usize,
}

impl CallData {
    pub fn new(data: Bytes) -> Self {
        let size = data.len();
        Self {
            data,
            offset: 0,
            size,
        }
    }

    pub fn slice(data: Bytes, offset: usize, size: usize) -> Self {
        Self { data, offset, size }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The full windowed payload.
    pub fn extract_all(&self) -> Bytes {
        let start = self.offset.min(self.data.len());
        let end = (self.offset + self.size).min(self.data.len());
        self.data.slice(start..end)
    }
}

/// A message moving value and/or invoking code at a target address.
#[derive(Debug, Clone)]
pub struct Message {
    pub sender: Address,
    pub to: Address,
    pub value: U256,
    pub gas: u64,
    pub data: CallData,
    /// When unset the value transfer step is skipped entirely; used by
    /// messages that only observe.
    pub transfers_value: bool,
    /// Shard range the message may touch.
    pub range: ShardRange,
}

impl Message {
    pub fn new(sender: Address, to: Address, value: U256, gas: u64, data: CallData) -> Self {
        Self {
            sender,
            to,
            value,
            gas,
            data,
            transfers_value: true,
            range: ShardRange::full(),
        }
    }

    pub fn with_range(mut self, range: ShardRange) -> Self {
        self.range = range;
        self
    }

    pub fn without_transfer(mut self) -> Self {
        self.transfers_value = false;
        self
    }

    pub fn left_bound(&self) -> u64 {
        self.range.left()
    }

    pub fn right_bound(&self) -> u64 {
        self.range.right()
    }
}
