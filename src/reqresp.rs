//! Request/response plumbing between the operator-facing commander and the
//! engine.
//!
//! Requests travel over a bounded channel together with a ticket number;
//! the response is delivered through a wait map keyed by that ticket, so
//! any number of requesters can be in flight concurrently.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_futures::join::join;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use maitake_sync::WaitMap;

pub struct ReqResp<Request, Response, const N: usize> {
    requests: Channel<CriticalSectionRawMutex, (u32, Request), N>,
    responses: WaitMap<u32, Response>,
    next_id: AtomicU32,
}

impl<Request, Response, const N: usize> ReqResp<Request, Response, N> {
    pub const fn new() -> Self {
        Self {
            requests: Channel::new(),
            responses: WaitMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Send a request and wait for its response.
    ///
    /// Cancel-safe: cancelling before the response arrives abandons the
    /// ticket, and a late response for it is discarded.
    pub async fn request(&self, request: Request) -> Response {
        let current_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (response, _) = join(
            self.responses.wait(current_id),
            self.requests.send((current_id, request)),
        )
        .await;

        response.expect("Always succeeds because we use a unique ID")
    }

    pub async fn wait_for_request(&self) -> (u32, Request) {
        self.requests.receive().await
    }

    pub fn respond(&self, id: u32, response: Response) {
        self.responses.wake(&id, response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[futures_test::test]
    async fn requests_get_their_own_response() {
        const MAX_VAL: u32 = 1000;
        let channel = ReqResp::<_, _, 4>::new();

        let requester = async {
            for i in 0..=MAX_VAL {
                assert_eq!(channel.request(i).await, i * 2);
            }
        };

        let responder = async {
            loop {
                let (id, request) = channel.wait_for_request().await;
                channel.respond(id, request * 2);

                if request == MAX_VAL {
                    break;
                }
            }
        };

        join(requester, responder).await;
    }
}
