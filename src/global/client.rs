//! Client side of the remote grant protocol.
//!
//! A node that does not own an application's bucket asks the owner to run its
//! gate for us. The owner only answers once a unit has been granted, so a
//! successful call here means the caller may go ahead.
use axum::http::StatusCode;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{BOT_HASH_HEADER, BOT_LIMIT_HEADER};
use crate::api::paths;
use crate::error::{NirnError, Result};

#[derive(Clone, Debug)]
pub struct GlobalGrantClient {
    client: reqwest::Client,
}

impl GlobalGrantClient {
    /// Build a client whose calls give up after `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Ask the node at `addr` (`host:port`) for one unit of `bot_hash`'s quota.
    ///
    /// Returns `NirnError::Cancelled` if `cancel` fires first, the transport
    /// error unchanged if the call never completes, and
    /// `NirnError::GlobalRequest` for any answer other than 200. No retries.
    pub async fn fire_global_request(
        &self,
        addr: &str,
        bot_hash: u64,
        bot_limit: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let request = self
            .client
            .get(global_url(addr))
            .header(BOT_HASH_HEADER, bot_hash.to_string())
            .header(BOT_LIMIT_HEADER, bot_limit.to_string());

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NirnError::Cancelled),
            response = request.send() => response?,
        };

        debug!(addr, bot_hash, status = %response.status(), "Got answer for global");

        if response.status() != StatusCode::OK {
            return Err(NirnError::GlobalRequest(response.status()));
        }
        Ok(())
    }
}

pub fn global_url(addr: &str) -> String {
    format!("http://{}{}", addr, paths::global::GLOBAL)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{http::HeaderMap, routing, Router};

    use super::*;

    async fn serve(router: Router) -> SocketAddr {
        let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap())
            .serve(router.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);
        addr
    }

    fn client() -> GlobalGrantClient {
        GlobalGrantClient::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn builds_global_url() {
        assert_eq!(
            global_url("10.0.0.3:8080"),
            "http://10.0.0.3:8080/nirn/global"
        );
    }

    #[tokio::test]
    async fn ok_answer_is_a_grant() {
        let router = Router::new().route(
            paths::global::GLOBAL,
            routing::get(|headers: HeaderMap| async move {
                if headers[BOT_HASH_HEADER] == "18446744073709551615"
                    && headers[BOT_LIMIT_HEADER] == "50"
                {
                    StatusCode::OK
                } else {
                    StatusCode::BAD_REQUEST
                }
            }),
        );
        let addr = serve(router).await;

        client()
            .fire_global_request(&addr.to_string(), u64::MAX, 50, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn other_status_is_an_error() {
        let router = Router::new().route(
            paths::global::GLOBAL,
            routing::get(|| async { StatusCode::TOO_MANY_REQUESTS }),
        );
        let addr = serve(router).await;

        let err = client()
            .fire_global_request(&addr.to_string(), 1, 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NirnError::GlobalRequest(StatusCode::TOO_MANY_REQUESTS)
        ));
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client()
            .fire_global_request(&addr.to_string(), 1, 1, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            NirnError::Transport(err) => assert!(err.is_connect()),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancellation_aborts_the_call() {
        let router = Router::new().route(
            paths::global::GLOBAL,
            routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                StatusCode::OK
            }),
        );
        let addr = serve(router).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client()
            .fire_global_request(&addr.to_string(), 1, 1, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, NirnError::Cancelled));
    }

    #[tokio::test]
    async fn expired_deadline_is_a_transport_error() {
        let router = Router::new().route(
            paths::global::GLOBAL,
            routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                StatusCode::OK
            }),
        );
        let addr = serve(router).await;

        let client = GlobalGrantClient::new(Duration::from_millis(100)).unwrap();
        let err = client
            .fire_global_request(&addr.to_string(), 1, 1, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            NirnError::Transport(err) => assert!(err.is_timeout()),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
