//! Ordering guarantees for stream parts.
//!
//! A well-formed stream opens with `StreamStart` and closes with `Finish`,
//! with nothing after it. [`LifecycleGuard`] repairs streams that break
//! this: it synthesizes a missing start, drops anything after the finish,
//! and optionally closes an unterminated stream with
//! `Finish { finish_reason: Other }`.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use pin_project_lite::pin_project;
use tracing::{debug, warn};

use crate::Result;
use crate::types::{FinishReason, PartStream, StreamPart, Usage};

pin_project! {
    /// Stream adapter enforcing start-first, finish-last ordering.
    pub struct LifecycleGuard<S> {
        #[pin]
        inner: S,
        started: bool,
        finished: bool,
        ended: bool,
        close_unterminated: bool,
        pending: VecDeque<Result<StreamPart>>,
    }
}

impl<S> LifecycleGuard<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            started: false,
            finished: false,
            ended: false,
            close_unterminated: false,
            pending: VecDeque::new(),
        }
    }

    /// Append `Finish { finish_reason: Other }` if the inner stream ends
    /// without finishing.
    #[must_use]
    pub fn close_unterminated(mut self, close: bool) -> Self {
        self.close_unterminated = close;
        self
    }
}

impl<S> Stream for LifecycleGuard<S>
where
    S: Stream<Item = Result<StreamPart>>,
{
    type Item = Result<StreamPart>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if let Some(item) = this.pending.pop_front() {
            return Poll::Ready(Some(item));
        }
        if *this.ended {
            return Poll::Ready(None);
        }

        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(part))) => {
                    if *this.finished {
                        warn!(?part, "dropping stream part after finish");
                        continue;
                    }
                    if !*this.started {
                        *this.started = true;
                        if matches!(part, StreamPart::StreamStart { .. }) {
                            return Poll::Ready(Some(Ok(part)));
                        }
                        if part.is_finish() {
                            *this.finished = true;
                        }
                        this.pending.push_back(Ok(part));
                        return Poll::Ready(Some(Ok(StreamPart::StreamStart {
                            warnings: Vec::new(),
                        })));
                    }
                    if matches!(part, StreamPart::StreamStart { .. }) {
                        debug!("dropping duplicate stream start");
                        continue;
                    }
                    if part.is_finish() {
                        *this.finished = true;
                    }
                    return Poll::Ready(Some(Ok(part)));
                }
                Poll::Ready(Some(Err(e))) => {
                    if *this.finished {
                        warn!(error = %e, "dropping stream error after finish");
                        continue;
                    }
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    *this.ended = true;
                    if *this.finished || !*this.close_unterminated {
                        return Poll::Ready(None);
                    }
                    *this.finished = true;
                    let finish = StreamPart::Finish {
                        usage: Usage::default(),
                        finish_reason: FinishReason::Other,
                        provider_metadata: None,
                    };
                    if !*this.started {
                        *this.started = true;
                        this.pending.push_back(Ok(finish));
                        return Poll::Ready(Some(Ok(StreamPart::StreamStart {
                            warnings: Vec::new(),
                        })));
                    }
                    return Poll::Ready(Some(Ok(finish)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Wrap a part stream in a [`LifecycleGuard`] that also closes
/// unterminated streams.
pub fn enforce_lifecycle(stream: PartStream) -> PartStream {
    Box::pin(LifecycleGuard::new(stream).close_unterminated(true))
}
