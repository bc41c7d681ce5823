use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;

use crate::transport::ProgressFn;

/// Block size handed to the HTTP client per poll.
///
/// Small enough for smooth progress on slow links, large enough to keep
/// per-block overhead negligible.
pub const REPORT_BLOCK_SIZE: u64 = 256 * 1024;

/// Request body that yields a chunk in blocks and reports progress.
///
/// A block counts as sent once it is handed to the HTTP client, so the
/// reported value leads the wire by at most one block and reaches the
/// chunk length with the final block.
pub struct ProgressStream {
    data: Bytes,
    sent: u64,
    reported: u64,
    block_size: u64,
    progress: ProgressFn,
}

impl ProgressStream {
    /// Wraps `data`; `block_size` of `None` uses [`REPORT_BLOCK_SIZE`].
    pub fn new(data: Bytes, progress: ProgressFn, block_size: Option<u64>) -> Self {
        Self {
            data,
            sent: 0,
            reported: 0,
            block_size: block_size.unwrap_or(REPORT_BLOCK_SIZE).max(1),
            progress,
        }
    }

    /// Total length of the body.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn report(&mut self) {
        if self.sent > self.reported {
            self.reported = self.sent;
            (self.progress)(self.sent);
        }
    }
}

impl Stream for ProgressStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let len = this.len();
        if this.sent >= len {
            return Poll::Ready(None);
        }

        let end = (this.sent + this.block_size).min(len);
        let block = this.data.slice(this.sent as usize..end as usize);
        this.sent = end;
        this.report();
        Poll::Ready(Some(Ok(block)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.len() - self.sent).div_ceil(self.block_size) as usize;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (ProgressFn, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let progress: ProgressFn = Arc::new(move |n| s.lock().unwrap().push(n));
        (progress, seen)
    }

    #[tokio::test]
    async fn yields_blocks_and_reports_cumulative_progress() {
        let (progress, seen) = recorder();
        let stream = ProgressStream::new(Bytes::from_static(b"0123456789"), progress, Some(4));

        let blocks: Vec<Bytes> = stream.map(|b| b.unwrap()).collect().await;
        assert_eq!(blocks.len(), 3);
        assert_eq!(&blocks[0][..], b"0123");
        assert_eq!(&blocks[2][..], b"89");

        assert_eq!(*seen.lock().unwrap(), vec![4, 8, 10]);
    }

    #[tokio::test]
    async fn empty_body_reports_nothing() {
        let (progress, seen) = recorder();
        let mut stream = ProgressStream::new(Bytes::new(), progress, None);

        assert!(stream.next().await.is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn size_hint_counts_remaining_blocks() {
        let (progress, _) = recorder();
        let stream = ProgressStream::new(Bytes::from(vec![0u8; 10]), progress, Some(4));
        assert_eq!(stream.size_hint(), (3, Some(3)));
    }
}
