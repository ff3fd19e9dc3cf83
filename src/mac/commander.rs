//! The operator's handle on the MAC engine.

use crate::{
    reqresp::ReqResp,
    sap::{ConfirmValue, Request, RequestValue},
};

pub const CHANNEL_SIZE: usize = 4;

/// The main interface to the MAC layer: issue requests, receive typed
/// confirms. One instance is shared between the operator side and the
/// engine.
pub struct MacCommander {
    request_confirm_channel: ReqResp<RequestValue, ConfirmValue, CHANNEL_SIZE>,
}

impl MacCommander {
    pub const fn new() -> Self {
        Self {
            request_confirm_channel: ReqResp::new(),
        }
    }

    /// Make a request to the MAC layer. The typed confirm response is returned.
    /// This API is cancel-safe, though the request may not have been sent at the point of cancellation.
    #[must_use]
    pub async fn request<R: Request>(&self, request: R) -> R::Confirm {
        self.request_confirm_channel
            .request(request.into())
            .await
            .into()
    }

    /// Get the inverse of the commander where the engine receives requests.
    pub(crate) fn get_handler(&self) -> MacHandler<'_> {
        MacHandler { commander: self }
    }
}

impl Default for MacCommander {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct MacHandler<'a> {
    commander: &'a MacCommander,
}

impl MacHandler<'_> {
    pub async fn wait_for_request(&self) -> RequestResponder<'_, RequestValue> {
        let (id, request) = self
            .commander
            .request_confirm_channel
            .wait_for_request()
            .await;
        RequestResponder {
            commander: self.commander,
            request,
            id,
        }
    }
}

pub struct RequestResponder<'a, T> {
    commander: &'a MacCommander,
    /// The request that was received
    pub request: T,
    id: u32,
}

impl<'a> RequestResponder<'a, RequestValue> {
    pub fn into_concrete<U: Request>(self) -> RequestResponder<'a, U> {
        let Self {
            commander,
            request,
            id,
        } = self;
        RequestResponder {
            commander,
            request: request.into(),
            id,
        }
    }
}

impl<T: Request> RequestResponder<'_, T> {
    pub fn respond(self, response: T::Confirm) {
        self.commander
            .request_confirm_channel
            .respond(self.id, response.into());
    }
}

