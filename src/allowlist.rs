use std::{collections::HashSet, net::IpAddr, sync::Arc};

use tonic::{service::Interceptor, Request, Status};
use tracing::warn;

/// Rejects requests from peers outside a fixed set of IP addresses.
///
/// Runs as a tonic interceptor, so a rejected request never reaches the
/// blob store.
#[derive(Debug, Clone)]
pub struct AllowList {
    allowed: Arc<HashSet<IpAddr>>,
}

impl AllowList {
    pub fn new(ips: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            allowed: Arc::new(ips.into_iter().map(canonical).collect()),
        }
    }

    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        self.allowed.contains(&canonical(ip))
    }
}

/// IPv4 peers accepted on a dual-stack socket show up as `::ffff:a.b.c.d`.
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        IpAddr::V4(_) => ip,
    }
}

impl Interceptor for AllowList {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        match request.remote_addr() {
            Some(peer) if self.is_allowed(peer.ip()) => Ok(request),
            Some(peer) => {
                warn!(peer = %peer, "rejected request from ip outside the allow-list");
                Err(Status::permission_denied("ip is not allowed"))
            }
            None => {
                warn!("rejected request without a peer address");
                Err(Status::permission_denied("ip is not allowed"))
            }
        }
    }
}
