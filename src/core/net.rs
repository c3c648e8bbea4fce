// src/core/net.rs

//! ICMP reachability helpers, implemented in-process with `surge-ping`
//! rather than shelling out to the system `ping` binary.

use std::net::IpAddr;
use std::time::Duration;
use tokio::time::sleep;

const PING_TIMEOUT: Duration = Duration::from_secs(2);
const WAIT_ONLINE_TIMEOUT: Duration = Duration::from_secs(180);
const WAIT_ONLINE_POLL: Duration = Duration::from_secs(3);
const PING_PAYLOAD: &[u8] = b"koth-ping";

/// A single best-effort ICMP echo, `false` on any error or timeout.
pub async fn ping_once(ip: &str) -> bool {
    let Ok(addr) = ip.parse::<IpAddr>() else {
        return false;
    };

    matches!(
        tokio::time::timeout(PING_TIMEOUT, surge_ping::ping(addr, PING_PAYLOAD)).await,
        Ok(Ok(_))
    )
}

/// Polls every 3 seconds, up to 3 minutes, for `ip` to answer an ICMP
/// echo. Used by the provisioning pipeline's Initialize stage.
pub async fn wait_online(ip: &str) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_ONLINE_TIMEOUT;
    loop {
        if ping_once(ip).await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        sleep(WAIT_ONLINE_POLL).await;
    }
}
