//! P1 (transparency) + P2 (no-interceptor octet-identity) + scenario 1
//! (plain GET passthrough) and scenario 4 (failed upstream returns 502): a
//! proxy with no interceptor raw-forwards (§4.4) rather than routing
//! through the external HTTP client, so the origin's response reaches the
//! client byte-for-byte.

use futures_lite::io::{AsyncReadExt, AsyncWriteExt};
use mitmdriver::Proxy;
use smol::net::{TcpListener, TcpStream};

async fn run_origin_once(listener: TcpListener, response: &'static str) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buf = [0u8; 4096];
    let _ = stream.read(&mut buf).await.unwrap();
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
}

#[test]
fn plain_get_is_forwarded_and_response_relayed() {
    smol::block_on(async {
        let origin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin_listener.local_addr().unwrap();
        let origin_task = smol::spawn(run_origin_once(
            origin_listener,
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello",
        ));

        let proxy = Proxy::builder().bind("127.0.0.1:0".parse().unwrap()).build();
        let proxy_addr = proxy.start().await.unwrap();

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        let request = format!(
            "GET http://{origin_addr}/hello HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n"
        );
        client.write_all(request.as_bytes()).await.unwrap();
        client.flush().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        // P2: no interceptor means the bytes on the wire are identical to
        // what a direct TCP connection to the origin would have produced.
        assert_eq!(
            response,
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec()
        );

        origin_task.await;
        proxy.stop().await.unwrap();
    });
}

#[test]
fn unreachable_upstream_yields_bad_gateway() {
    smol::block_on(async {
        // Bind and immediately drop so the port is (almost certainly)
        // refusing connections for the rest of the test.
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = probe.local_addr().unwrap();
        drop(probe);

        let proxy = Proxy::builder().bind("127.0.0.1:0".parse().unwrap()).build();
        let proxy_addr = proxy.start().await.unwrap();

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        let request = format!("GET http://{dead_addr}/ HTTP/1.1\r\nHost: {dead_addr}\r\n\r\n");
        client.write_all(request.as_bytes()).await.unwrap();
        client.flush().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 502"));

        proxy.stop().await.unwrap();
    });
}
