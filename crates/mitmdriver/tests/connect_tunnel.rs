//! Scenario 3: a `CONNECT` tunnel with no interceptor configured is pure
//! byte forwarding — whatever the client writes after the `200` arrives
//! unmodified at the origin, and vice versa.

use futures_lite::io::{AsyncReadExt, AsyncWriteExt};
use mitmdriver::Proxy;
use smol::net::{TcpListener, TcpStream};

async fn echo_once(listener: TcpListener) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    stream.write_all(&buf[..n]).await.unwrap();
    stream.flush().await.unwrap();
}

#[test]
fn connect_tunnel_forwards_raw_bytes_both_ways() {
    smol::block_on(async {
        let origin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin_listener.local_addr().unwrap();
        let origin_task = smol::spawn(echo_once(origin_listener));

        let proxy = Proxy::builder().bind("127.0.0.1:0".parse().unwrap()).build();
        let proxy_addr = proxy.start().await.unwrap();

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        let connect_req = format!("CONNECT {origin_addr} HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");
        client.write_all(connect_req.as_bytes()).await.unwrap();
        client.flush().await.unwrap();

        let mut head = [0u8; 128];
        let n = client.read(&mut head).await.unwrap();
        let head = String::from_utf8_lossy(&head[..n]);
        assert!(head.starts_with("HTTP/1.1 200"));

        client.write_all(b"ping").await.unwrap();
        client.flush().await.unwrap();

        let mut echoed = [0u8; 16];
        let n = client.read(&mut echoed).await.unwrap();
        assert_eq!(&echoed[..n], b"ping");

        origin_task.await;
        proxy.stop().await.unwrap();
    });
}
