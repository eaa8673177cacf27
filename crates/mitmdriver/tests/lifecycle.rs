//! P6: `start`/`stop` lifecycle — idempotence and listen-socket release.

use mitmdriver::{Proxy, ProxyError};

#[test]
fn starting_twice_is_rejected() {
    smol::block_on(async {
        let proxy = Proxy::builder().bind("127.0.0.1:0".parse().unwrap()).build();
        proxy.start().await.expect("first start should succeed");
        let second = proxy.start().await;
        assert!(matches!(second, Err(ProxyError::AlreadyStarted)));
        proxy.stop().await.unwrap();
    });
}

#[test]
fn stopping_twice_is_rejected() {
    smol::block_on(async {
        let proxy = Proxy::builder().bind("127.0.0.1:0".parse().unwrap()).build();
        proxy.start().await.unwrap();
        proxy.stop().await.expect("first stop should succeed");
        let second = proxy.stop().await;
        assert!(matches!(second, Err(ProxyError::NotRunning)));
    });
}

#[test]
fn stop_before_start_is_rejected() {
    smol::block_on(async {
        let proxy = Proxy::builder().bind("127.0.0.1:0".parse().unwrap()).build();
        let result = proxy.stop().await;
        assert!(matches!(result, Err(ProxyError::NotRunning)));
    });
}

#[test]
fn stop_releases_the_listening_port() {
    smol::block_on(async {
        let proxy = Proxy::builder().bind("127.0.0.1:0".parse().unwrap()).build();
        let addr = proxy.start().await.unwrap();
        proxy.stop().await.unwrap();

        // Give the accept loop a moment to observe the shutdown signal and
        // drop its listener.
        smol::Timer::after(std::time::Duration::from_millis(50)).await;

        // A fresh bind to the same address should now succeed (SO_REUSEADDR
        // means this would also succeed even if the old listener lingered,
        // so the real assertion is that connecting fails: nothing is
        // listening anymore).
        let connect = smol::net::TcpStream::connect(addr).await;
        assert!(connect.is_err());
    });
}
