//! Memcached text-protocol client.
//!
//! Speaks the subset of the ASCII protocol the session layer needs:
//!
//! ```text
//! get <key>\r\n                          -> VALUE <key> <flags> <bytes>\r\n<data>\r\nEND\r\n | END\r\n
//! set <key> 0 <exptime> <bytes>\r\n<data>\r\n -> STORED\r\n | NOT_STORED\r\n
//! delete <key>\r\n                       -> DELETED\r\n | NOT_FOUND\r\n
//! ```
//!
//! One TCP connection is shared by all callers; requests are serialized over
//! it. Any failure drops the connection and the next request reconnects.
//! Nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::client::{CacheClient, Expiry, validate_key};
use crate::error::{CacheError, Result};

type Connection = BufStream<TcpStream>;

enum Request<'a> {
    Get(&'a str),
    Set {
        key: &'a str,
        exptime: u64,
        value: &'a [u8],
    },
    Delete(&'a str),
}

impl Request<'_> {
    fn op(&self) -> &'static str {
        match self {
            Request::Get(_) => "get",
            Request::Set { .. } => "set",
            Request::Delete(_) => "delete",
        }
    }
}

enum Response {
    Value(Option<Vec<u8>>),
    Stored,
    Deleted(bool),
}

/// Client for a single memcached server.
pub struct MemcachedClient {
    addr: String,
    timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl MemcachedClient {
    /// Connect to the server at `addr` (`host:port`).
    ///
    /// `timeout` bounds the initial connect and every later round trip.
    pub async fn connect(addr: impl Into<String>, timeout: Duration) -> Result<Self> {
        let addr = addr.into();
        let conn = open(&addr, timeout).await?;
        debug!(addr = %addr, "connected to memcached");

        Ok(Self {
            addr,
            timeout,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// The `host:port` this client talks to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn execute(&self, request: Request<'_>) -> Result<Response> {
        let mut guard = self.conn.lock().await;

        // The connection stays out of the slot for the whole exchange. If
        // this future is dropped mid-reply the slot is left empty and the
        // next caller reconnects instead of reading a stale reply.
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => {
                debug!(addr = %self.addr, "reconnecting to memcached");
                open(&self.addr, self.timeout).await?
            }
        };

        let op = request.op();
        let result = match tokio::time::timeout(self.timeout, round_trip(&mut conn, &request)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                op,
                millis: self.timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(_) | Err(CacheError::NotStored(_)) => *guard = Some(conn),
            Err(ref e) => {
                warn!(addr = %self.addr, op, error = %e, "memcached request failed, dropping connection");
            }
        }
        result
    }
}

async fn open(addr: &str, timeout: Duration) -> Result<Connection> {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(CacheError::Connect {
                addr: addr.to_string(),
                source,
            });
        }
        Err(_) => {
            return Err(CacheError::Timeout {
                op: "connect",
                millis: timeout.as_millis() as u64,
            });
        }
    };
    stream.set_nodelay(true)?;
    Ok(BufStream::new(stream))
}

async fn round_trip(conn: &mut Connection, request: &Request<'_>) -> Result<Response> {
    match request {
        Request::Get(key) => {
            conn.write_all(format!("get {key}\r\n").as_bytes()).await?;
            conn.flush().await?;
            read_get_reply(conn, key).await.map(Response::Value)
        }
        Request::Set {
            key,
            exptime,
            value,
        } => {
            let header = format!("set {key} 0 {exptime} {}\r\n", value.len());
            conn.write_all(header.as_bytes()).await?;
            conn.write_all(value).await?;
            conn.write_all(b"\r\n").await?;
            conn.flush().await?;

            let line = read_line(conn).await?;
            match line.as_str() {
                "STORED" => Ok(Response::Stored),
                "NOT_STORED" => Err(CacheError::NotStored(key.to_string())),
                _ => Err(CacheError::Protocol(line)),
            }
        }
        Request::Delete(key) => {
            conn.write_all(format!("delete {key}\r\n").as_bytes()).await?;
            conn.flush().await?;

            let line = read_line(conn).await?;
            match line.as_str() {
                "DELETED" => Ok(Response::Deleted(true)),
                "NOT_FOUND" => Ok(Response::Deleted(false)),
                _ => Err(CacheError::Protocol(line)),
            }
        }
    }
}

async fn read_get_reply(conn: &mut Connection, key: &str) -> Result<Option<Vec<u8>>> {
    let line = read_line(conn).await?;
    if line == "END" {
        return Ok(None);
    }

    let len = parse_value_header(&line, key)?;
    let mut data = vec![0u8; len + 2];
    conn.read_exact(&mut data).await?;
    if !data.ends_with(b"\r\n") {
        return Err(CacheError::Protocol(format!(
            "value for '{key}' not terminated by CRLF"
        )));
    }
    data.truncate(len);

    let end = read_line(conn).await?;
    if end != "END" {
        return Err(CacheError::Protocol(end));
    }
    Ok(Some(data))
}

/// Parse `VALUE <key> <flags> <bytes> [<cas>]` and return the byte count.
fn parse_value_header(line: &str, key: &str) -> Result<usize> {
    let mut parts = line.split(' ');
    if parts.next() != Some("VALUE") {
        return Err(CacheError::Protocol(line.to_string()));
    }
    if parts.next() != Some(key) {
        return Err(CacheError::Protocol(format!(
            "reply for wrong key (expected '{key}'): {line}"
        )));
    }
    let _flags = parts.next();
    parts
        .next()
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(|| CacheError::Protocol(line.to_string()))
}

async fn read_line(conn: &mut Connection) -> Result<String> {
    let mut line = String::new();
    let n = conn.read_line(&mut line).await?;
    if n == 0 {
        return Err(CacheError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "memcached closed the connection",
        )));
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
    trace!(reply = %trimmed, "memcached reply");
    Ok(trimmed)
}

#[async_trait]
impl CacheClient for MemcachedClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        match self.execute(Request::Get(key)).await? {
            Response::Value(value) => Ok(value),
            _ => Err(CacheError::Protocol("mismatched reply to get".to_string())),
        }
    }

    async fn set(&self, key: &str, expiry: Expiry, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        let request = Request::Set {
            key,
            exptime: expiry.as_exptime(),
            value,
        };
        match self.execute(request).await? {
            Response::Stored => Ok(()),
            _ => Err(CacheError::Protocol("mismatched reply to set".to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        match self.execute(Request::Delete(key)).await? {
            Response::Deleted(existed) => Ok(existed),
            _ => Err(CacheError::Protocol(
                "mismatched reply to delete".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "memcached"
    }
}

impl std::fmt::Debug for MemcachedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcachedClient")
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_header() {
        assert_eq!(parse_value_header("VALUE abc 0 5", "abc").unwrap(), 5);
        assert_eq!(parse_value_header("VALUE abc 12 0 991", "abc").unwrap(), 0);
    }

    #[test]
    fn test_parse_value_header_rejects_garbage() {
        assert!(parse_value_header("SERVER_ERROR out of memory", "abc").is_err());
        assert!(parse_value_header("VALUE other 0 5", "abc").is_err());
        assert!(parse_value_header("VALUE abc 0 five", "abc").is_err());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = MemcachedClient::connect(addr, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Connect { .. } | CacheError::Timeout { .. }
        ));
    }
}
