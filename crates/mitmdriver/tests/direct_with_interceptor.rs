//! Scenario 2 (header rewrite), scenario 5 (response status rewrite), P4
//! (drop suppresses the response chain and the upstream call entirely)
//! and P5 (concurrent clients don't observe each other's state).

use futures_lite::io::{AsyncReadExt, AsyncWriteExt};
use mitmdriver::{Action, Chain, ChainBuilder, Field, Interceptor, Proxy, Value, Verdict};
use smol::net::{TcpListener, TcpStream};

async fn respond_once(listener: TcpListener, body: &'static str) -> Vec<(String, String)> {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    loop {
        let n = stream.read(&mut tmp).await.unwrap();
        buf.extend_from_slice(&tmp[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || n == 0 {
            break;
        }
    }
    let request = String::from_utf8_lossy(&buf).to_string();
    let headers: Vec<(String, String)> = request
        .lines()
        .skip(1)
        .take_while(|l| !l.is_empty())
        .filter_map(|l| l.split_once(": ").map(|(k, v)| (k.to_string(), v.to_string())))
        .collect();

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
    headers
}

#[test]
fn request_chain_rewrites_a_header_before_the_origin_sees_it() {
    smol::block_on(async {
        let origin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin_listener.local_addr().unwrap();
        let origin_task = smol::spawn(respond_once(origin_listener, "ok"));

        let request_chain = ChainBuilder::new(Verdict::Accept)
            .rule(mitmdriver::Rule::new(
                Field::Header("X-Injected".into()),
                Action::Replace(Value::Text("yes".into())),
            ))
            .build();
        let interceptor = Interceptor::new(request_chain, Chain::new(Verdict::Accept));

        let proxy = Proxy::builder()
            .bind("127.0.0.1:0".parse().unwrap())
            .interceptor(interceptor)
            .build();
        let proxy_addr = proxy.start().await.unwrap();

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        let request = format!("GET http://{origin_addr}/ HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");
        client.write_all(request.as_bytes()).await.unwrap();
        client.flush().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 200"));

        let received_headers = origin_task.await;
        assert!(received_headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("x-injected") && v == "yes"));

        proxy.stop().await.unwrap();
    });
}

#[test]
fn response_chain_rewrites_status_code() {
    smol::block_on(async {
        let origin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin_listener.local_addr().unwrap();
        let origin_task = smol::spawn(respond_once(origin_listener, "ok"));

        let response_chain = ChainBuilder::new(Verdict::Accept)
            .rule(mitmdriver::Rule::new(
                Field::Status,
                Action::Replace(Value::Status(201)),
            ))
            .build();
        let interceptor = Interceptor::new(Chain::new(Verdict::Accept), response_chain);

        let proxy = Proxy::builder()
            .bind("127.0.0.1:0".parse().unwrap())
            .interceptor(interceptor)
            .build();
        let proxy_addr = proxy.start().await.unwrap();

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        let request = format!("GET http://{origin_addr}/ HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");
        client.write_all(request.as_bytes()).await.unwrap();
        client.flush().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 201"));

        origin_task.await;
        proxy.stop().await.unwrap();
    });
}

#[test]
fn dropped_request_never_reaches_the_origin_and_closes_with_no_response() {
    smol::block_on(async {
        // No origin listener at all: if the chain's drop verdict were
        // ignored and the request forwarded anyway, this would fail with
        // a connection-refused 502 instead of a clean close.
        let request_chain = ChainBuilder::new(Verdict::Accept)
            .rule(mitmdriver::Rule::new(Field::Method, Action::Drop))
            .build();
        let interceptor = Interceptor::new(request_chain, Chain::new(Verdict::Accept));

        let proxy = Proxy::builder()
            .bind("127.0.0.1:0".parse().unwrap())
            .interceptor(interceptor)
            .build();
        let proxy_addr = proxy.start().await.unwrap();

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        let request = "GET http://127.0.0.1:1/ HTTP/1.1\r\nHost: 127.0.0.1:1\r\n\r\n";
        client.write_all(request.as_bytes()).await.unwrap();
        client.flush().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.is_empty(), "dropped request must yield no response bytes at all");

        proxy.stop().await.unwrap();
    });
}

#[test]
fn concurrent_clients_do_not_observe_each_others_responses() {
    smol::block_on(async {
        let origin_a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr_a = origin_a.local_addr().unwrap();
        let task_a = smol::spawn(respond_once(origin_a, "from-a"));

        let origin_b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr_b = origin_b.local_addr().unwrap();
        let task_b = smol::spawn(respond_once(origin_b, "from-b"));

        let proxy = Proxy::builder().bind("127.0.0.1:0".parse().unwrap()).build();
        let proxy_addr = proxy.start().await.unwrap();

        let client_a = async move {
            let mut client = TcpStream::connect(proxy_addr).await.unwrap();
            let request = format!("GET http://{addr_a}/ HTTP/1.1\r\nHost: {addr_a}\r\n\r\n");
            client.write_all(request.as_bytes()).await.unwrap();
            client.flush().await.unwrap();
            let mut response = Vec::new();
            client.read_to_end(&mut response).await.unwrap();
            String::from_utf8_lossy(&response).to_string()
        };
        let client_b = async move {
            let mut client = TcpStream::connect(proxy_addr).await.unwrap();
            let request = format!("GET http://{addr_b}/ HTTP/1.1\r\nHost: {addr_b}\r\n\r\n");
            client.write_all(request.as_bytes()).await.unwrap();
            client.flush().await.unwrap();
            let mut response = Vec::new();
            client.read_to_end(&mut response).await.unwrap();
            String::from_utf8_lossy(&response).to_string()
        };

        let (response_a, response_b) = futures_lite::future::zip(client_a, client_b).await;
        assert!(response_a.ends_with("from-a"));
        assert!(response_b.ends_with("from-b"));

        task_a.await;
        task_b.await;
        proxy.stop().await.unwrap();
    });
}
