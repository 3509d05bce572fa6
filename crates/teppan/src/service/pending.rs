use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use crate::error::{DispatchError, Result};
use crate::tensor::Sequence;

/// # Pending
///
/// The eventual encoding of one submitted sequence.
///
/// Resolves to the encoded sequence, to the error of the batch it was part
/// of, or to [`DispatchError::ServiceStopped`] if the service went away
/// without answering.
pub struct Pending {
    receiver: oneshot::Receiver<Result<Sequence>>,
}

impl Pending {
    pub(crate) fn new(receiver: oneshot::Receiver<Result<Sequence>>) -> Self {
        Self { receiver }
    }
}

impl Future for Pending {
    type Output = Result<Sequence>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DispatchError::ServiceStopped)))
    }
}
