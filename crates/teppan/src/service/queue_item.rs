use tokio::sync::oneshot::Sender;
use crate::error::Result;
use crate::tensor::Sequence;

/// # QueueItem
///
/// A submitted sequence paired with the channel its encoding is sent back on.
pub(crate) struct QueueItem {
    input: Sequence,
    sender: Sender<Result<Sequence>>,
}

impl QueueItem {
    pub fn new(input: Sequence, sender: Sender<Result<Sequence>>) -> Self {
        Self { input, sender }
    }

    pub fn input(&self) -> &Sequence {
        &self.input
    }

    /// Consumes the item, yielding its reply channel.
    pub fn sender(self) -> Sender<Result<Sequence>> {
        self.sender
    }
}
