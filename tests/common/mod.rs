//! Scripted HTTP/1.1 server for transfers that go wrong mid-stream
//!
//! httpmock always sends complete bodies, so connections that drop or hang
//! partway through are served from a raw socket instead. Each accepted
//! connection consumes the next [`Reply`]; requests are recorded lowercased.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the server does once the reply bytes are written
#[derive(Debug, Clone, Copy)]
pub enum Ending {
    /// Close the connection
    Close,
    /// Keep the connection open without sending anything more
    Stall,
}

/// One canned answer
#[derive(Debug, Clone)]
pub struct Reply {
    head: String,
    body: Vec<u8>,
    ending: Ending,
}

impl Reply {
    /// 200 advertising `advertised` bytes, of which only `body` is sent
    pub fn full(advertised: usize, body: &[u8], ending: Ending) -> Self {
        Self {
            head: format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                advertised
            ),
            body: body.to_vec(),
            ending,
        }
    }

    /// Complete 206 answer carrying `body` from `offset` of a `total`-byte file
    pub fn partial(offset: usize, total: usize, body: &[u8]) -> Self {
        Self {
            head: format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                offset,
                total - 1,
                total,
                body.len()
            ),
            body: body.to_vec(),
            ending: Ending::Close,
        }
    }
}

pub struct ScriptedServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedServer {
    pub async fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            for reply in replies {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let log = Arc::clone(&log);
                tokio::spawn(serve(socket, reply, log));
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve(mut socket: TcpStream, reply: Reply, log: Arc<Mutex<Vec<String>>>) {
    let request = read_head(&mut socket).await;
    log.lock().unwrap().push(request);

    if socket.write_all(reply.head.as_bytes()).await.is_err()
        || socket.write_all(&reply.body).await.is_err()
        || socket.flush().await.is_err()
    {
        return;
    }

    match reply.ending {
        Ending::Close => {
            let _ = socket.shutdown().await;
        }
        Ending::Stall => std::future::pending::<()>().await,
    }
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).to_lowercase()
}
