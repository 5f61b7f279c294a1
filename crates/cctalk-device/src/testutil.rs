//! A scripted link for tests.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use cctalk_link::{Link, LinkError, Reply};
use cctalk_types::Header;

/// A mock transport scripted per header.
///
/// Replies queue up per header and are consumed in order, except that the
/// last reply for a header is sticky: once the queue is down to one entry
/// it keeps answering with it. Headers with no script answer with an ACK
/// (empty payload). Every request is recorded for assertions.
pub(crate) struct MockLink {
    replies: Mutex<HashMap<u8, VecDeque<Result<Vec<u8>, LinkError>>>>,
    sent: Mutex<Vec<(u8, Vec<u8>)>>,
    ids: AtomicU64,
}

impl MockLink {
    pub(crate) fn new() -> MockLink {
        MockLink {
            replies: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            ids: AtomicU64::new(0),
        }
    }

    /// Queue a successful reply payload for `header`.
    pub(crate) fn on(&self, header: Header, data: Vec<u8>) {
        self.replies
            .lock()
            .unwrap()
            .entry(header.wire())
            .or_default()
            .push_back(Ok(data));
    }

    /// Queue a link error for `header`.
    pub(crate) fn on_error(&self, header: Header, error: LinkError) {
        self.replies
            .lock()
            .unwrap()
            .entry(header.wire())
            .or_default()
            .push_back(Err(error));
    }

    /// Every `(header, payload)` sent so far, in order.
    pub(crate) fn sent(&self) -> Vec<(u8, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    /// Requests sent with `header`.
    pub(crate) fn sent_with(&self, header: Header) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| *h == header.wire())
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl Link for MockLink {
    async fn transact(
        &self,
        header: Header,
        payload: Vec<u8>,
        _response_timeout: Duration,
    ) -> Result<Reply, LinkError> {
        self.sent.lock().unwrap().push((header.wire(), payload));

        let outcome = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&header.wire()) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok(Vec::new())),
                Some(queue) => queue.front().cloned().unwrap_or(Ok(Vec::new())),
                None => Ok(Vec::new()),
            }
        };

        let request_id = self.ids.fetch_add(1, Ordering::Relaxed) + 1;
        outcome.map(|data| Reply { request_id, data })
    }
}
