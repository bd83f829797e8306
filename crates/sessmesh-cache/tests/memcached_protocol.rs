//! Memcached client tests against an in-process fake server.
//!
//! The fake speaks just enough of the text protocol (get/set/delete) to
//! exercise the client's framing, error mapping and reconnect behaviour.
//! A get of "slow" answers after a short delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sessmesh_cache::{CacheClient, CacheError, Expiry, MemcachedClient};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

type Store = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Start a fake memcached and return its address.
async fn start_fake_memcached() -> (String, Store) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let store: Store = Arc::new(Mutex::new(HashMap::new()));

    let server_store = store.clone();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(serve(socket, server_store.clone()));
        }
    });

    (addr, store)
}

async fn serve(socket: TcpStream, store: Store) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            return;
        }
        let parts: Vec<&str> = line.trim_end().split(' ').collect();

        let reply: Vec<u8> = match parts.as_slice() {
            ["get", "slow"] => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                b"END\r\n".to_vec()
            }
            ["get", key] => match store.lock().await.get(*key) {
                Some(value) => {
                    let mut out = format!("VALUE {key} 0 {}\r\n", value.len()).into_bytes();
                    out.extend_from_slice(value);
                    out.extend_from_slice(b"\r\nEND\r\n");
                    out
                }
                None => b"END\r\n".to_vec(),
            },
            ["set", key, _flags, _exptime, len] => {
                let len: usize = len.parse().unwrap();
                let mut data = vec![0u8; len + 2];
                reader.read_exact(&mut data).await.unwrap();
                data.truncate(len);
                if *key == "oom" {
                    b"SERVER_ERROR out of memory storing object\r\n".to_vec()
                } else if *key == "refuse" {
                    b"NOT_STORED\r\n".to_vec()
                } else {
                    store.lock().await.insert(key.to_string(), data);
                    b"STORED\r\n".to_vec()
                }
            }
            ["delete", key] => match store.lock().await.remove(*key) {
                Some(_) => b"DELETED\r\n".to_vec(),
                None => b"NOT_FOUND\r\n".to_vec(),
            },
            ["quit"] => return,
            _ => b"ERROR\r\n".to_vec(),
        };

        if write.write_all(&reply).await.is_err() {
            return;
        }
    }
}

async fn client(addr: &str) -> MemcachedClient {
    MemcachedClient::connect(addr, Duration::from_secs(2))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_set_then_get() {
    let (addr, store) = start_fake_memcached().await;
    let cache = client(&addr).await;

    cache
        .set("abc/foo", Expiry::Never, b"{\"n\":1000}")
        .await
        .unwrap();

    assert_eq!(
        cache.get("abc/foo").await.unwrap(),
        Some(b"{\"n\":1000}".to_vec())
    );
    assert!(store.lock().await.contains_key("abc/foo"));
}

#[tokio::test]
async fn test_get_missing_is_none() {
    let (addr, _) = start_fake_memcached().await;
    let cache = client(&addr).await;

    assert_eq!(cache.get("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_binary_values_with_crlf() {
    let (addr, _) = start_fake_memcached().await;
    let cache = client(&addr).await;

    let value = b"line one\r\nline two\r\n\x00\xff".to_vec();
    cache.set("blob", Expiry::Never, &value).await.unwrap();
    assert_eq!(cache.get("blob").await.unwrap(), Some(value));
}

#[tokio::test]
async fn test_delete_reports_existence() {
    let (addr, _) = start_fake_memcached().await;
    let cache = client(&addr).await;

    cache.set("k", Expiry::Never, b"v").await.unwrap();
    assert!(cache.delete("k").await.unwrap());
    assert!(!cache.delete("k").await.unwrap());
    assert_eq!(cache.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_server_error_maps_to_protocol_error() {
    let (addr, _) = start_fake_memcached().await;
    let cache = client(&addr).await;

    let err = cache.set("oom", Expiry::Never, b"v").await.unwrap_err();
    assert!(matches!(err, CacheError::Protocol(msg) if msg.starts_with("SERVER_ERROR")));

    // The client reconnects and keeps working after a failed request.
    cache.set("after", Expiry::Never, b"ok").await.unwrap();
    assert_eq!(cache.get("after").await.unwrap(), Some(b"ok".to_vec()));
}

#[tokio::test]
async fn test_not_stored() {
    let (addr, _) = start_fake_memcached().await;
    let cache = client(&addr).await;

    let err = cache.set("refuse", Expiry::Never, b"v").await.unwrap_err();
    assert!(matches!(err, CacheError::NotStored(key) if key == "refuse"));
}

#[tokio::test]
async fn test_invalid_key_never_hits_the_wire() {
    let (addr, store) = start_fake_memcached().await;
    let cache = client(&addr).await;

    let err = cache
        .set("has space", Expiry::Never, b"v")
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::InvalidKey { .. }));
    assert!(store.lock().await.is_empty());
}

#[tokio::test]
async fn test_timeout_on_silent_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        // Accept and hold connections without ever answering.
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let cache = MemcachedClient::connect(&addr, Duration::from_millis(100))
        .await
        .unwrap();
    let err = cache.get("anything").await.unwrap_err();
    assert!(matches!(err, CacheError::Timeout { op: "get", .. }));
}

#[tokio::test]
async fn test_concurrent_callers_share_connection() {
    let (addr, _) = start_fake_memcached().await;
    let cache = Arc::new(client(&addr).await);

    let mut handles = Vec::new();
    for i in 0..16 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("key-{i}");
            let value = format!("value-{i}");
            cache
                .set(&key, Expiry::Never, value.as_bytes())
                .await
                .unwrap();
            cache.get(&key).await.unwrap()
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let value = handle.await.unwrap();
        assert_eq!(value, Some(format!("value-{i}").into_bytes()));
    }
}

#[tokio::test]
async fn test_cancelled_get_does_not_leak_its_reply() {
    let (addr, _) = start_fake_memcached().await;
    let cache = client(&addr).await;
    cache.set("present", Expiry::Never, b"42").await.unwrap();

    // Give up on the request after it is on the wire but before its reply lands.
    let cancelled = tokio::time::timeout(Duration::from_millis(5), cache.get("slow")).await;
    assert!(cancelled.is_err());

    // Let the late "END" for the abandoned get arrive.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(cache.get("present").await.unwrap(), Some(b"42".to_vec()));
    assert_eq!(cache.get("missing").await.unwrap(), None);
}
