//! HTTP+JSON implementation of the peer RPC surface: an axum server
//! exposing `PeerSigner` to the network, and a reqwest-based
//! [`PeerTransport`] the driver and catch-up engine dial peers through.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use beacon_core::bls::PartialSignature;
use beacon_core::group::PeerIdentity;
use beacon_core::Beacon;

use crate::signer::PeerSigner;
use crate::transport::PeerTransport;
use crate::wire::{BeaconRequest, BeaconResponse, GetBeaconResponse};
use crate::{NetError, Result};

/// Builds the axum router serving `POST /beacon` (`NewBeacon`) and
/// `GET /beacon/{round}` (`GetBeacon`) against `signer`. Mounted by the
/// `node` binary alongside whatever public read API it also serves.
pub fn router(signer: Arc<PeerSigner>) -> Router {
    Router::new()
        .route("/beacon", post(new_beacon))
        .route("/beacon/{round}", get(get_beacon))
        .with_state(signer)
}

async fn new_beacon(
    State(signer): State<Arc<PeerSigner>>,
    Json(request): Json<BeaconRequest>,
) -> Response {
    match signer.process_beacon(&request) {
        Ok(partial) => Json(BeaconResponse { partial }).into_response(),
        Err(err) => net_error_response(&err),
    }
}

async fn get_beacon(
    State(signer): State<Arc<PeerSigner>>,
    Path(round): Path<u64>,
) -> Response {
    match signer.get_beacon(round) {
        Ok(beacon) => Json(GetBeaconResponse { beacon }).into_response(),
        Err(err) => net_error_response(&err),
    }
}

fn net_error_response(err: &NetError) -> Response {
    let status = match err {
        NetError::OutsideWindow { .. } => StatusCode::FORBIDDEN,
        NetError::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        log::warn!("peer RPC request failed: {err}");
    } else {
        log::debug!("peer RPC request rejected: {err}");
    }
    (status, err.to_string()).into_response()
}

/// Client half: dials peers over HTTP+JSON using `reqwest`, with a
/// per-call timeout set by the caller (spec.md §4.5: `min(P/2,
/// dial_timeout)`).
pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    pub fn new(call_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .expect("reqwest client builds with a fixed timeout");
        Self { client }
    }

    fn base_url(peer: &PeerIdentity) -> String {
        let scheme = if peer.tls { "https" } else { "http" };
        format!("{scheme}://{}", peer.address)
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn new_beacon(
        &self,
        peer: &PeerIdentity,
        request: BeaconRequest,
    ) -> Result<PartialSignature> {
        let url = format!("{}/beacon", Self::base_url(peer));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| dial_error(peer, &e))?;

        if !response.status().is_success() {
            return Err(NetError::Rejected {
                peer: peer.address.clone(),
                message: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<no body>".to_string()),
            });
        }

        let body: BeaconResponse = response.json().await.map_err(|e| NetError::Malformed {
            peer: peer.address.clone(),
            message: e.to_string(),
        })?;
        Ok(body.partial)
    }

    async fn get_beacon(&self, peer: &PeerIdentity, round: u64) -> Result<Beacon> {
        let url = format!("{}/beacon/{round}", Self::base_url(peer));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| dial_error(peer, &e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(NetError::NotFound { round });
        }
        if !response.status().is_success() {
            return Err(NetError::Rejected {
                peer: peer.address.clone(),
                message: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<no body>".to_string()),
            });
        }

        let body: GetBeaconResponse = response.json().await.map_err(|e| NetError::Malformed {
            peer: peer.address.clone(),
            message: e.to_string(),
        })?;
        Ok(body.beacon)
    }
}

fn dial_error(peer: &PeerIdentity, err: &reqwest::Error) -> NetError {
    if err.is_timeout() {
        NetError::Timeout {
            peer: peer.address.clone(),
        }
    } else {
        NetError::Dial {
            peer: peer.address.clone(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::group::{GroupDescriptor, NodeShare};
    use beacon_store::memory::MemoryStore;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    fn group() -> GroupDescriptor {
        GroupDescriptor {
            nodes: vec![],
            threshold: 1,
            group_public_key: vec![0u8; 48],
            period: std::time::Duration::from_secs(30),
            genesis_time: 0,
        }
    }

    async fn spawn_server(signer: Arc<PeerSigner>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(signer)).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn get_beacon_round_trips_over_http() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(Beacon::new(1, b"seed".to_vec(), vec![7, 7, 7], group().gid()))
            .unwrap();
        let signer = Arc::new(PeerSigner::new(
            store,
            NodeShare {
                index: 0,
                secret: vec![1u8; 32],
            },
            group(),
        ));
        let addr = spawn_server(signer).await;

        let peer = PeerIdentity {
            index: 0,
            address: addr.to_string(),
            commitment: vec![0u8; 48],
            tls: false,
        };
        let transport = HttpPeerTransport::new(Duration::from_secs(5));
        let beacon = transport.get_beacon(&peer, 1).await.unwrap();
        assert_eq!(beacon.round, 1);
    }

    #[tokio::test]
    async fn get_beacon_reports_not_found_over_http() {
        let store = Arc::new(MemoryStore::new());
        let signer = Arc::new(PeerSigner::new(
            store,
            NodeShare {
                index: 0,
                secret: vec![1u8; 32],
            },
            group(),
        ));
        let addr = spawn_server(signer).await;

        let peer = PeerIdentity {
            index: 0,
            address: addr.to_string(),
            commitment: vec![0u8; 48],
            tls: false,
        };
        let transport = HttpPeerTransport::new(Duration::from_secs(5));
        assert!(matches!(
            transport.get_beacon(&peer, 1).await,
            Err(NetError::NotFound { round: 1 })
        ));
    }

    #[tokio::test]
    async fn new_beacon_rejects_replay_over_http() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(Beacon::new(10, b"p".to_vec(), vec![1, 2, 3], group().gid()))
            .unwrap();
        let signer = Arc::new(PeerSigner::new(
            store,
            NodeShare {
                index: 0,
                secret: vec![1u8; 32],
            },
            group(),
        ));
        let addr = spawn_server(signer).await;

        let peer = PeerIdentity {
            index: 0,
            address: addr.to_string(),
            commitment: vec![0u8; 48],
            tls: false,
        };
        let transport = HttpPeerTransport::new(Duration::from_secs(5));
        let request = BeaconRequest {
            round: 1,
            previous_rand: b"seed".to_vec(),
        };
        assert!(matches!(
            transport.new_beacon(&peer, request).await,
            Err(NetError::Rejected { .. })
        ));
    }
}
