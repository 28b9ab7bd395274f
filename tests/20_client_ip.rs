use portal_core::net::{parse_client_ip, TrustedProxies};

fn loopback_trusted() -> TrustedProxies {
    TrustedProxies::parse(&["127.0.0.1/8".to_string()]).unwrap()
}

fn resolve(remote: &str, xff: &str) -> (String, String) {
    let addr = parse_client_ip(remote, xff, &loopback_trusted()).unwrap();
    (addr.ip.to_string(), addr.chain)
}

#[test]
fn direct_loopback_peer() {
    assert_eq!(
        resolve("127.0.0.1:12345", ""),
        ("127.0.0.1".to_string(), "127.0.0.1".to_string())
    );
}

#[test]
fn untrusted_peer_ignores_forwarded_header() {
    assert_eq!(
        resolve("192.0.2.1:12345", "192.0.2.2"),
        ("192.0.2.1".to_string(), "192.0.2.2, 192.0.2.1".to_string())
    );
}

#[test]
fn trusted_peer_yields_forwarded_client() {
    assert_eq!(
        resolve("127.0.0.1:12345", "192.0.2.2"),
        ("192.0.2.2".to_string(), "192.0.2.2, 127.0.0.1".to_string())
    );
}

#[test]
fn space_separated_header_is_normalized() {
    assert_eq!(
        resolve("127.0.0.1:12345", "127.0.0.1 192.0.2.2"),
        (
            "192.0.2.2".to_string(),
            "127.0.0.1, 192.0.2.2, 127.0.0.1".to_string()
        )
    );
}

#[test]
fn garbage_peer_is_rejected() {
    assert!(parse_client_ip("nonsense", "", &loopback_trusted()).is_err());
}
