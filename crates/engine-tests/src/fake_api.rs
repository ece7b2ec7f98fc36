//! Minimal OPTIMADE `/structures` endpoint over a loopback socket.

use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

pub struct FakeOptimade {
    pub url: String,
    requests: Arc<Mutex<Vec<(u64, u64)>>>,
    handle: JoinHandle<()>,
}

impl FakeOptimade {
    pub async fn start(entries: Vec<Value>) -> Self {
        Self::start_with(entries, None, HashMap::new()).await
    }

    /// After `max_connections` accepted connections the listener is closed,
    /// so later requests are refused. `statuses` forces an HTTP status for
    /// the page at a given offset.
    pub async fn start_with(
        entries: Vec<Value>,
        max_connections: Option<usize>,
        statuses: HashMap<u64, u16>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/structures", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let entries = Arc::new(entries);
        let statuses = Arc::new(statuses);
        let log = requests.clone();
        let handle = tokio::spawn(async move {
            let mut accepted = 0usize;
            while max_connections.is_none_or(|max| accepted < max) {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                accepted += 1;
                tokio::spawn(respond(
                    socket,
                    entries.clone(),
                    statuses.clone(),
                    log.clone(),
                ));
            }
        });

        FakeOptimade {
            url,
            requests,
            handle,
        }
    }

    /// `(offset, limit)` of every request served so far, sorted by offset.
    pub fn requests(&self) -> Vec<(u64, u64)> {
        let mut requests = self.requests.lock().unwrap().clone();
        requests.sort();
        requests
    }
}

impl Drop for FakeOptimade {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond(
    mut socket: TcpStream,
    entries: Arc<Vec<Value>>,
    statuses: Arc<HashMap<u64, u16>>,
    log: Arc<Mutex<Vec<(u64, u64)>>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 2048];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let target = head.split_whitespace().nth(1).unwrap_or("/");
    let params = query_params(target);
    let offset = params.get("page_offset").copied().unwrap_or(0);
    let limit = params.get("page_limit").copied().unwrap_or(10);
    log.lock().unwrap().push((offset, limit));

    let (status, body) = match statuses.get(&offset) {
        Some(status) => (*status, json!({"errors": [{"status": status.to_string()}]})),
        None => {
            let start = (offset as usize).min(entries.len());
            let end = (start + limit as usize).min(entries.len());
            (
                200,
                json!({
                    "data": &entries[start..end],
                    "meta": {"data_returned": entries.len()}
                }),
            )
        }
    };

    let body = body.to_string();
    let reply = format!(
        "HTTP/1.1 {status} Fake\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(reply.as_bytes()).await;
    let _ = socket.shutdown().await;
}

fn query_params(target: &str) -> HashMap<&str, u64> {
    target
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter_map(|(key, value)| value.parse().ok().map(|v| (key, v)))
        .collect()
}

/// `count` structures with ids `agm000000..`, all modified on `date`.
pub fn structures(count: usize, date: &str) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "id": format!("agm{i:06}"),
                "type": "structures",
                "attributes": {
                    "elements": ["O", "Si"],
                    "chemical_formula_reduced": "O2Si",
                    "last_modified": format!("{date}T12:00:00Z")
                }
            })
        })
        .collect()
}
