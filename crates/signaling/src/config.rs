use crate::transport::DEFAULT_OUTBOUND_CAPACITY;
use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

const DEFAULT_LISTEN_PORT: u16 = 8080;
const DEFAULT_LISTEN_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_NOTIFY_PEER_LEFT: bool = false;

#[derive(Debug, Clone)]
pub struct SignalingServerConfig {
    pub listen_addr: SocketAddr,
    /// Broadcast `peer-left` to the old room when a member disconnects or switches rooms.
    pub notify_peer_left: bool,
    /// Messages buffered per connection before further sends to it are dropped.
    pub outbound_queue_capacity: usize,
}

impl SignalingServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        // PORT is what most hosting platforms inject
        let listen_port = env::var("SIGNALING_PORT")
            .or_else(|_| env::var("PORT"))
            .ok()
            .and_then(|raw| parse_port(&raw))
            .unwrap_or(DEFAULT_LISTEN_PORT);

        let listen_ip = env::var("SIGNALING_ADDR")
            .ok()
            .and_then(|raw| raw.parse::<IpAddr>().ok())
            .unwrap_or(DEFAULT_LISTEN_IP);

        let notify_peer_left = env::var("SIGNALING_NOTIFY_PEER_LEFT")
            .ok()
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(DEFAULT_NOTIFY_PEER_LEFT);

        let outbound_queue_capacity = env::var("SIGNALING_OUTBOUND_QUEUE")
            .ok()
            .and_then(|raw| parse_capacity(&raw))
            .unwrap_or(DEFAULT_OUTBOUND_CAPACITY);

        Ok(Self {
            listen_addr: SocketAddr::new(listen_ip, listen_port),
            notify_peer_left,
            outbound_queue_capacity,
        })
    }
}

impl Default for SignalingServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(DEFAULT_LISTEN_IP, DEFAULT_LISTEN_PORT),
            notify_peer_left: DEFAULT_NOTIFY_PEER_LEFT,
            outbound_queue_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok()
}

fn parse_capacity(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|capacity| *capacity > 0)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listens_on_all_interfaces() {
        let config = SignalingServerConfig::default();
        assert_eq!(config.listen_addr.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.listen_addr.port(), 8080);
        assert!(!config.notify_peer_left);
        assert_eq!(config.outbound_queue_capacity, 100);
    }

    #[test]
    fn test_parse_capacity() {
        assert_eq!(parse_capacity("256"), Some(256));
        assert_eq!(parse_capacity("0"), None);
        assert_eq!(parse_capacity("-1"), None);
        assert_eq!(parse_capacity("lots"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("9000"), Some(9000));
        assert_eq!(parse_port(" 3000\n"), Some(3000));
        assert_eq!(parse_port("70000"), None);
        assert_eq!(parse_port("http"), None);
    }
}
