#[cfg(test)]
use mockall::automock;
use async_trait::async_trait;
use tracing::debug;

use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::BackoffPolicy;
use crate::ClientError;
use crate::CoordinatorRequest;
use crate::CoordinatorResponse;
use crate::CoordinatorService;
use crate::ErrorCode;
use crate::Result;

/// Delivers a request to the coordinator owning it
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoordinatorTransport: Send + Sync + 'static {
    async fn send(
        &self,
        request: CoordinatorRequest,
    ) -> CoordinatorResponse;
}

#[async_trait]
impl CoordinatorTransport for CoordinatorService {
    async fn send(
        &self,
        request: CoordinatorRequest,
    ) -> CoordinatorResponse {
        self.handle(request).await
    }
}

/// Tries each node in turn until one owns the request.
///
/// The node that answered last is tried first on the next request.
pub struct RoutingTransport {
    services: Vec<CoordinatorService>,
    preferred: parking_lot::Mutex<usize>,
}

impl RoutingTransport {
    pub fn new(services: Vec<CoordinatorService>) -> Self {
        Self {
            services,
            preferred: parking_lot::Mutex::new(0),
        }
    }
}

#[async_trait]
impl CoordinatorTransport for RoutingTransport {
    async fn send(
        &self,
        request: CoordinatorRequest,
    ) -> CoordinatorResponse {
        let start = *self.preferred.lock();
        let mut last = None;
        for i in 0..self.services.len() {
            let idx = (start + i) % self.services.len();
            let response = self.services[idx].handle(request.clone()).await;
            if !matches!(
                response.error_code(),
                ErrorCode::NotCoordinator | ErrorCode::CoordinatorNotAvailable
            ) {
                *self.preferred.lock() = idx;
                return response;
            }
            debug!("node #{} does not own {}", idx, request.api_name());
            last = Some(response);
        }
        last.unwrap_or_else(|| request.failed(ErrorCode::CoordinatorNotAvailable))
    }
}

/// Sends `request`, retrying retriable error codes under `policy`.
///
/// A response carrying any other error code becomes [`ClientError::Rpc`].
pub(crate) async fn call(
    transport: &dyn CoordinatorTransport,
    request: CoordinatorRequest,
    policy: BackoffPolicy,
) -> Result<CoordinatorResponse> {
    let api = request.api_name();
    let request = &request;
    task_with_timeout_and_exponential_backoff(
        api,
        || async move {
            let response = transport.send(request.clone()).await;
            match response.error_code() {
                ErrorCode::None => Ok(response),
                code => Err(ClientError::Rpc { operation: api, code }.into()),
            }
        },
        policy,
    )
    .await
}
