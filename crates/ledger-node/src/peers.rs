//! Peer address book and scatter/gather calls to other nodes.
//!
//! Every fan-out issues its requests concurrently and waits for all of them;
//! a peer that fails is recorded in the report and never aborts the rest.

use crate::config::normalize_url;
use futures::future::join_all;
use ledger_core::ChainSnapshot;
use serde::{de::DeserializeOwned, Serialize};
use std::{collections::BTreeSet, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer {peer} unreachable: {source}")]
    Unreachable {
        peer: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("peer {peer} answered {status}")]
    Refused { peer: String, status: reqwest::StatusCode },
    #[error("cannot build peer HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Known peers of one node. Never contains the node's own URL.
#[derive(Debug, Clone)]
pub struct PeerSet {
    own_url: String,
    peers: BTreeSet<String>,
}

impl PeerSet {
    pub fn new(own_url: impl Into<String>) -> Self {
        Self {
            own_url: normalize_url(&own_url.into()),
            peers: BTreeSet::new(),
        }
    }

    /// Returns false for the node's own URL, blanks and peers already known.
    pub fn insert(&mut self, url: &str) -> bool {
        let url = normalize_url(url);
        if url.is_empty() || url == self.own_url {
            return false;
        }
        self.peers.insert(url)
    }

    /// Idempotent union; returns how many peers were new.
    pub fn extend<'a, I>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        urls.into_iter().filter(|url| self.insert(url)).count()
    }

    pub fn urls(&self) -> Vec<String> {
        self.peers.iter().cloned().collect()
    }

    /// Every peer plus this node, the set a newcomer is asked to adopt.
    pub fn with_own_url(&self) -> Vec<String> {
        let mut all = self.urls();
        all.push(self.own_url.clone());
        all
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerOutcome {
    pub peer: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FanOutReport(pub Vec<PeerOutcome>);

impl FanOutReport {
    fn record<T>(&mut self, peer: &str, result: &Result<T, PeerError>) {
        let error = result.as_ref().err().map(|e| e.to_string());
        if let Some(e) = &error {
            warn!("{e}");
        }
        self.0.push(PeerOutcome {
            peer: peer.to_string(),
            ok: error.is_none(),
            error,
        });
    }

    pub fn failures(&self) -> usize {
        self.0.iter().filter(|o| !o.ok).count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// HTTP client for talking to other nodes.
#[derive(Debug, Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(timeout: Duration) -> Result<Self, PeerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PeerError::Client)?;
        Ok(Self { http })
    }

    pub async fn post<B: Serialize + ?Sized>(&self, peer: &str, path: &str, body: &B) -> Result<(), PeerError> {
        debug!(peer, path, "POST");
        let response = self
            .http
            .post(format!("{peer}{path}"))
            .json(body)
            .send()
            .await
            .map_err(|source| unreachable(peer, source))?;
        check_status(peer, &response)?;
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, peer: &str, path: &str) -> Result<T, PeerError> {
        debug!(peer, path, "GET");
        let response = self
            .http
            .get(format!("{peer}{path}"))
            .send()
            .await
            .map_err(|source| unreachable(peer, source))?;
        check_status(peer, &response)?;
        response.json::<T>().await.map_err(|source| unreachable(peer, source))
    }

    /// POSTs `body` to `path` on every peer at once.
    pub async fn broadcast<B: Serialize + ?Sized + Sync>(&self, peers: &[String], path: &str, body: &B) -> FanOutReport {
        let results = join_all(peers.iter().map(|peer| self.post(peer, path, body))).await;
        let mut report = FanOutReport::default();
        for (peer, result) in peers.iter().zip(results) {
            report.record(peer, &result);
        }
        report
    }

    /// Fetches `/blockchain` from every peer. Snapshots come back in peer
    /// order; peers that failed are only present in the report.
    pub async fn gather_snapshots(&self, peers: &[String]) -> (Vec<ChainSnapshot>, FanOutReport) {
        let results = join_all(peers.iter().map(|peer| self.get::<ChainSnapshot>(peer, "/blockchain"))).await;
        let mut report = FanOutReport::default();
        let mut snapshots = Vec::with_capacity(results.len());
        for (peer, result) in peers.iter().zip(results) {
            report.record(peer, &result);
            if let Ok(snapshot) = result {
                snapshots.push(snapshot);
            }
        }
        (snapshots, report)
    }
}

fn unreachable(peer: &str, source: reqwest::Error) -> PeerError {
    PeerError::Unreachable {
        peer: peer.to_string(),
        source,
    }
}

fn check_status(peer: &str, response: &reqwest::Response) -> Result<(), PeerError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(PeerError::Refused {
            peer: peer.to_string(),
            status,
        })
    }
}
