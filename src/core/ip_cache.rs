//! Process-wide client IP resolver.
//!
//! Every outbound request carries the same `X-Forwarded-For` / `X-Real-IP` value: an
//! address of this host, not of the browser that asked. The value is computed lazily from
//! the interface table and kept in a single swappable slot that a background sweeper
//! empties on a fixed interval. Readers never block: the slot is an [`ArcSwapOption`].
use std::{
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::Duration,
};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{task::JoinHandle, time::Instant};

use crate::{
    ports::{InterfaceSource, NetworkInterface},
    utils::ShutdownToken,
};

/// Default sweep interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Which fallback step produced the cached address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IpSource {
    /// First IPv4 address of a non-internal interface
    ExternalInterface,
    /// First IPv4 address of any interface
    AnyInterface,
    /// Nothing usable was found
    Loopback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientIpEntry {
    pub ip: IpAddr,
    pub source: IpSource,
    pub created_at: DateTime<Utc>,
}

/// Pick the client IP from an interface listing.
pub fn select_client_ip(interfaces: &[NetworkInterface]) -> (IpAddr, IpSource) {
    let ipv4 = || interfaces.iter().filter(|i| i.addr.is_ipv4());

    if let Some(iface) = ipv4().find(|i| !i.internal) {
        return (iface.addr, IpSource::ExternalInterface);
    }
    if let Some(iface) = ipv4().next() {
        return (iface.addr, IpSource::AnyInterface);
    }
    (LOOPBACK, IpSource::Loopback)
}

pub struct ClientIpCache {
    slot: ArcSwapOption<ClientIpEntry>,
    interfaces: Arc<dyn InterfaceSource>,
}

impl ClientIpCache {
    pub fn new(interfaces: Arc<dyn InterfaceSource>) -> Self {
        Self {
            slot: ArcSwapOption::empty(),
            interfaces,
        }
    }

    /// The live entry, if any, without resolving.
    pub fn current(&self) -> Option<Arc<ClientIpEntry>> {
        self.slot.load_full()
    }

    /// Return the live entry, resolving and storing a new one when the slot is empty.
    ///
    /// Concurrent resolvers racing on an empty slot all end up with the entry that was
    /// stored first.
    pub fn resolve(&self) -> Arc<ClientIpEntry> {
        if let Some(entry) = self.slot.load_full() {
            return entry;
        }

        let (ip, source) = select_client_ip(&self.interfaces.interfaces());
        let fresh = Arc::new(ClientIpEntry {
            ip,
            source,
            created_at: Utc::now(),
        });

        let mut winner = None;
        self.slot.rcu(|current| {
            let entry = current.clone().unwrap_or_else(|| Arc::clone(&fresh));
            winner = Some(Arc::clone(&entry));
            Some(entry)
        });

        let entry = winner.unwrap_or(fresh);
        if entry.source == IpSource::Loopback {
            tracing::warn!("No IPv4 interface found, using loopback as client IP");
        } else {
            tracing::debug!(ip = %entry.ip, source = ?entry.source, "Resolved client IP");
        }
        entry
    }

    /// The address presented to upstreams as the originating client.
    pub fn resolve_client_ip(&self) -> String {
        self.resolve().ip.to_string()
    }

    /// Drop the cached entry; the next [`resolve`](Self::resolve) recomputes it.
    pub fn clear(&self) {
        self.slot.store(None);
    }

    /// Spawn the background task that clears the slot every `every`, until shutdown.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        mut shutdown: ShutdownToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!("Client IP sweeper started. Interval: {:?}", every);
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.clear();
                        tracing::debug!("Client IP cache cleared");
                    }
                    _ = shutdown.wait_for_shutdown() => break,
                }
            }
            tracing::info!("Client IP sweeper stopped");
        })
    }
}
