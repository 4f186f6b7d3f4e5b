use serde_json::json;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use t2m_common::log::Logger;
use t2m_http::OAuth1Credentials;
use t2m_social::twitter::backoff::ReconnectPolicy;
use t2m_social::twitter::client::FILTER_PATH;
use t2m_social::twitter::{StreamItem, TrackFilter, TwitterStreamClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use wiremock::matchers::{body_string, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Recorded(Mutex<Vec<(&'static str, String)>>);

impl Recorded {
    fn push(&self, level: &'static str, args: fmt::Arguments<'_>) {
        self.0.lock().unwrap().push((level, args.to_string()));
    }

    fn at(&self, level: &str) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Logger for Recorded {
    fn debug(&self, args: fmt::Arguments<'_>) {
        self.push("debug", args)
    }
    fn info(&self, args: fmt::Arguments<'_>) {
        self.push("info", args)
    }
    fn notice(&self, args: fmt::Arguments<'_>) {
        self.push("notice", args)
    }
    fn warning(&self, args: fmt::Arguments<'_>) {
        self.push("warning", args)
    }
    fn error(&self, args: fmt::Arguments<'_>) {
        self.push("error", args)
    }
    fn critical(&self, args: fmt::Arguments<'_>) {
        self.push("critical", args)
    }
}

fn creds() -> OAuth1Credentials {
    OAuth1Credentials {
        consumer_key: "ck".into(),
        consumer_secret: "cs".into(),
        token: "at".into(),
        token_secret: "ats".into(),
    }
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        network_step: Duration::from_millis(10),
        network_max: Duration::from_millis(50),
        http_initial: Duration::from_millis(10),
        http_max: Duration::from_millis(50),
        rate_limited_initial: Duration::from_millis(10),
    }
}

fn tweet_line(id: &str, text: &str) -> String {
    json!({
        "id_str": id,
        "text": text,
        "user": { "id_str": "7", "name": "Seven", "screen_name": "seven" },
        "lang": "en"
    })
    .to_string()
}

fn client(server: &MockServer, log: Arc<Recorded>) -> TwitterStreamClient {
    TwitterStreamClient::new(&server.uri(), creds(), log)
        .unwrap()
        .with_reconnect_policy(fast_policy())
}

#[tokio::test]
async fn delivers_items_in_order_then_closes_on_terminal_status() {
    let server = MockServer::start().await;
    let body = format!(
        "{}\r\n\r\n{}\r\n{}\r\n",
        tweet_line("1", "first example.org"),
        r#"{"delete":{"status":{"id_str":"0","user_id_str":"7"}}}"#,
        tweet_line("2", "second"),
    );
    Mock::given(method("POST"))
        .and(path(format!("/{FILTER_PATH}")))
        .and(header_exists("authorization"))
        .and(body_string("track=rust%2Ctokio"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/{FILTER_PATH}")))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"errors":[{"code":32,"message":"Could not authenticate you."}]}"#,
        ))
        .mount(&server)
        .await;

    let log = Arc::new(Recorded::default());
    let filter = TrackFilter::new(["rust", "tokio"]).unwrap();
    let mut sub = client(&server, log.clone())
        .public_filter(&filter)
        .await
        .expect("first connect succeeds");

    let mut kinds = Vec::new();
    let mut ids = Vec::new();
    while let Some(item) = timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("stream ends after the 401")
    {
        kinds.push(item.kind().to_owned());
        if let StreamItem::Tweet(t) = item {
            ids.push(t.id_str);
        }
    }

    assert_eq!(kinds, ["tweet", "delete", "tweet"]);
    assert_eq!(ids, ["1", "2"]);
    let critical = log.at("critical");
    assert_eq!(critical.len(), 1);
    assert!(critical[0].contains("Could not authenticate you."));
}

#[tokio::test]
async fn bad_credentials_fail_at_startup() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{FILTER_PATH}")))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let filter = TrackFilter::new(["rust"]).unwrap();
    let err = client(&server, Arc::new(Recorded::default()))
        .public_filter(&filter)
        .await
        .err()
        .expect("401 is fatal");
    assert!(format!("{err:#}").contains("401"), "{err:#}");
}

#[tokio::test]
async fn stop_ends_the_subscription_while_reconnecting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{FILTER_PATH}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(tweet_line("1", "hi") + "\n"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // Every later attempt hangs long enough to still be in flight at stop().
    Mock::given(method("POST"))
        .and(path(format!("/{FILTER_PATH}")))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let filter = TrackFilter::new(["rust"]).unwrap();
    let mut sub = client(&server, Arc::new(Recorded::default()))
        .public_filter(&filter)
        .await
        .unwrap();

    let first = sub.recv().await.expect("one tweet");
    assert_eq!(first.kind(), "tweet");

    let handle = sub.stop_handle();
    sub.stop();
    sub.stop();
    assert!(handle.is_stopped());

    let rest = timeout(Duration::from_secs(5), async {
        let mut n = 0;
        while sub.recv().await.is_some() {
            n += 1;
        }
        n
    })
    .await
    .expect("channel closes after stop");
    assert_eq!(rest, 0);
}

#[tokio::test]
async fn closed_connection_is_reopened() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{FILTER_PATH}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(tweet_line("1", "a") + "\n"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/{FILTER_PATH}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(tweet_line("2", "b") + "\n"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/{FILTER_PATH}")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let log = Arc::new(Recorded::default());
    let filter = TrackFilter::new(["rust"]).unwrap();
    let mut sub = client(&server, log.clone())
        .public_filter(&filter)
        .await
        .unwrap();

    let mut ids = Vec::new();
    while let Some(item) = timeout(Duration::from_secs(5), sub.recv()).await.unwrap() {
        if let StreamItem::Tweet(t) = item {
            ids.push(t.id_str);
        }
    }
    assert_eq!(ids, ["1", "2"]);
    assert_eq!(log.at("notice").len(), 2, "connected + reconnected");
}

#[tokio::test]
async fn undecodable_lines_are_skipped_without_dropping_the_connection() {
    let server = MockServer::start().await;
    let mut body = Vec::new();
    body.extend_from_slice(tweet_line("1", "before").as_bytes());
    body.extend_from_slice(b"\r\n\xff\xfe{bad}\r\n");
    body.extend_from_slice(&vec![b'x'; 2 << 20]);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(tweet_line("2", "after").as_bytes());
    body.extend_from_slice(b"\r\n");
    Mock::given(method("POST"))
        .and(path(format!("/{FILTER_PATH}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/{FILTER_PATH}")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let log = Arc::new(Recorded::default());
    let filter = TrackFilter::new(["rust"]).unwrap();
    let mut sub = client(&server, log.clone())
        .public_filter(&filter)
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Some(item) = timeout(Duration::from_secs(5), sub.recv()).await.unwrap() {
        kinds.push(item.kind().to_owned());
    }
    assert_eq!(kinds, ["tweet", "malformed", "malformed", "tweet"]);
    // Only the end of the body dropped the connection.
    assert_eq!(log.at("warning").len(), 1, "{:?}", log.at("warning"));
}

/// Reads one request, headers and body, so closing the socket later is clean.
async fn read_request(sock: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = sock.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client hung up mid-request");
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let len: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .map(|v| v.trim().parse().unwrap())
            .unwrap_or(0);
        if buf.len() >= end + 4 + len {
            return;
        }
    }
}

#[tokio::test]
async fn stalled_connection_is_dropped_and_reopened() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        for n in 0.. {
            let (mut sock, _) = listener.accept().await.unwrap();
            read_request(&mut sock).await;
            match n {
                // One line, then silence with the response still open.
                0 => {
                    let line = tweet_line("1", "then nothing") + "\n";
                    let head = "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n";
                    let chunk = format!("{:x}\r\n{line}\r\n", line.len());
                    sock.write_all(head.as_bytes()).await.unwrap();
                    sock.write_all(chunk.as_bytes()).await.unwrap();
                    held.push(sock);
                }
                1 => {
                    let line = tweet_line("2", "fresh connection") + "\n";
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{line}",
                        line.len()
                    );
                    sock.write_all(resp.as_bytes()).await.unwrap();
                }
                _ => {
                    let resp = "HTTP/1.1 403 Forbidden\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
                    sock.write_all(resp.as_bytes()).await.unwrap();
                }
            }
        }
    });

    let log = Arc::new(Recorded::default());
    let filter = TrackFilter::new(["rust"]).unwrap();
    let mut sub = TwitterStreamClient::new(&format!("http://{addr}/"), creds(), log.clone())
        .unwrap()
        .with_reconnect_policy(fast_policy())
        .with_stall_timeout(Duration::from_millis(200))
        .public_filter(&filter)
        .await
        .unwrap();

    let mut ids = Vec::new();
    while let Some(item) = timeout(Duration::from_secs(5), sub.recv()).await.unwrap() {
        if let StreamItem::Tweet(t) = item {
            ids.push(t.id_str);
        }
    }
    assert_eq!(ids, ["1", "2"]);
    let warnings = log.at("warning");
    assert!(warnings[0].contains("no data for"), "{warnings:?}");
}
