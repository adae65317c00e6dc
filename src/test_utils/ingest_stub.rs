//! Loopback stand-in for the data collector endpoint.
//!
//! Each accepted connection is answered with the next scripted reply. The
//! request is kept exactly as it arrived on the wire: header names keep
//! their case and order, and the body is kept as raw bytes so tests can
//! compare it against the length the client signed.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::signer::{DATE_HEADER, SigningKey, authorization_header, sign, string_to_sign};

const WAIT: Duration = Duration::from_secs(5);

/// One POST as received by the stub.
#[derive(Debug)]
pub(crate) struct IngestRequest {
    pub method: String,
    pub target: String,
    /// Header lines in arrival order, names as sent.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub received_at: Instant,
}

impl IngestRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Names of the headers in the order they were written.
    pub fn header_names(&self) -> Vec<&str> {
        self.headers.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// The `Content-Length` the client declared.
    pub fn declared_length(&self) -> Option<usize> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    /// Whether the `Authorization` header matches a signature computed here
    /// from the received body length and `x-ms-date`.
    pub fn is_signed_by(&self, workspace_id: &str, key: &SigningKey) -> bool {
        let Some(date) = self.header(DATE_HEADER) else {
            return false;
        };
        let signature = sign(&string_to_sign(self.body.len(), date), key);
        let expected = authorization_header(workspace_id, &signature);
        self.header("authorization") == Some(expected.as_str())
    }

    /// The body decoded as the JSON array of records.
    pub fn records(&self) -> Vec<Value> {
        match serde_json::from_slice(&self.body).expect("body is JSON") {
            Value::Array(items) => items,
            other => panic!("expected JSON array, got {other}"),
        }
    }
}

/// Running stub endpoint. The serving thread exits once every scripted
/// reply has been used.
pub(crate) struct IngestStub {
    addr: SocketAddr,
    requests: Receiver<IngestRequest>,
}

impl IngestStub {
    pub fn start(replies: Vec<(u16, &'static str)>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener has address");
        let (tx, requests) = mpsc::channel();

        thread::spawn(move || {
            for (status, body) in replies {
                let Ok((mut stream, _)) = listener.accept() else {
                    break;
                };
                let request = read_request(&stream);
                let reason = if status == 200 { "OK" } else { "Scripted" };
                let reply = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes());
                if tx.send(request).is_err() {
                    break;
                }
            }
        });

        Self { addr, requests }
    }

    /// Ingestion URL pointing at the stub.
    pub fn url(&self) -> String {
        format!("http://{}/api/logs?api-version=2016-04-01", self.addr)
    }

    pub fn next_request(&self) -> IngestRequest {
        self.requests
            .recv_timeout(WAIT)
            .expect("stub received a request")
    }
}

fn read_request(stream: &TcpStream) -> IngestRequest {
    stream
        .set_read_timeout(Some(WAIT))
        .expect("set read timeout");
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .expect("read request line");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read header line");
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.to_string(), value.trim().to_string()));
        }
    }

    let mut request = IngestRequest {
        method,
        target,
        headers,
        body: Vec::new(),
        received_at: Instant::now(),
    };
    let mut body = vec![0u8; request.declared_length().unwrap_or(0)];
    reader.read_exact(&mut body).expect("read declared body");
    request.body = body;
    request
}

/// URL of a loopback port nothing listens on.
pub(crate) fn unreachable_url() -> String {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener has address");
    drop(listener);
    format!("http://{addr}/api/logs")
}
