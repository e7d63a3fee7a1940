use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use sockline_core::api::{
    ConnectOptions, ConnectResult, DisconnectOptions, DisconnectResult, ReadOptions, ReadResult,
    SendOptions,
};
use sockline_core::{
    ClientConfig, ConnectionHandle, ConnectionState, Encoding, ErrorKind, SocketPlugin, TcpSocket,
};

/// Echo server on an ephemeral loopback port.
async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = socket.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

fn connect_opts(addr: SocketAddr) -> ConnectOptions {
    ConnectOptions {
        ip_address: Some(addr.ip().to_string()),
        port: Some(i64::from(addr.port())),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hex_send_utf8_read_roundtrip() {
    let addr = spawn_echo_server().await;
    let socket = TcpSocket::new(ClientConfig::default());

    let ConnectResult { client } = socket.connect(connect_opts(addr)).await.unwrap();
    assert_eq!(client, 0);

    socket
        .send(SendOptions {
            client: Some(client),
            data: "48656c6c6f".into(),
            encoding: Some(Encoding::Hex),
            timeout: None,
        })
        .await
        .unwrap();

    let read = socket
        .read(ReadOptions {
            client: Some(client),
            expect_len: Some(1024),
            encoding: Some(Encoding::Utf8),
            timeout: Some(5),
        })
        .await
        .unwrap();
    assert_eq!(
        read,
        ReadResult {
            result: "Hello".into(),
            encoding: Encoding::Utf8
        }
    );

    socket.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_utf8_read_falls_back_to_base64() {
    let addr = spawn_echo_server().await;
    let socket = TcpSocket::new(ClientConfig::default());
    let ConnectResult { client } = socket.connect(connect_opts(addr)).await.unwrap();

    socket
        .send(SendOptions {
            client: Some(client),
            data: "//4=".into(),
            encoding: Some(Encoding::Base64),
            timeout: None,
        })
        .await
        .unwrap();

    let read = socket
        .read(ReadOptions {
            client: Some(client),
            expect_len: Some(16),
            encoding: None,
            timeout: Some(5),
        })
        .await
        .unwrap();
    assert_eq!(read.encoding, Encoding::Base64);
    assert_eq!(read.result, "//4=");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_read_bounded_by_expect_len() {
    let addr = spawn_echo_server().await;
    let socket = TcpSocket::new(ClientConfig::default());
    let ConnectResult { client } = socket.connect(connect_opts(addr)).await.unwrap();

    socket
        .send(SendOptions {
            client: Some(client),
            data: "abcdef".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let first = socket
        .read(ReadOptions {
            client: Some(client),
            expect_len: Some(2),
            encoding: Some(Encoding::Hex),
            timeout: Some(5),
        })
        .await
        .unwrap();
    assert_eq!(first.result, "6162");

    let rest = socket
        .read(ReadOptions {
            client: Some(client),
            expect_len: Some(64),
            timeout: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(rest.result, "cdef");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handles_are_never_reused() {
    let addr = spawn_echo_server().await;
    let socket = TcpSocket::new(ClientConfig::default());

    let first = socket.connect(connect_opts(addr)).await.unwrap().client;
    let DisconnectResult { client } = socket
        .disconnect(DisconnectOptions {
            client: Some(first),
        })
        .await
        .unwrap();
    assert_eq!(client, first);

    let second = socket.connect(connect_opts(addr)).await.unwrap().client;
    assert_eq!((first, second), (0, 1));

    let err = socket
        .disconnect(DisconnectOptions {
            client: Some(first),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyClosed);

    // handle 0 が閉じても handle 1 は使える
    socket
        .send(SendOptions {
            client: Some(second),
            data: "ping".into(),
            ..Default::default()
        })
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_read_after_peer_close_is_not_connected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut server, _) = listener.accept().await.unwrap();
        server.shutdown().await.unwrap();
        drop(server);
        let _ = closed_tx.send(());
    });

    let socket = TcpSocket::new(ClientConfig::default());
    let client = socket.connect(connect_opts(addr)).await.unwrap().client;
    closed_rx.await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = socket
        .read(ReadOptions {
            client: Some(client),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);

    let handle = ConnectionHandle::try_from(client).unwrap();
    let conn = socket.registry().resolve(handle).unwrap();
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_client_is_out_of_range() {
    let socket = TcpSocket::new(ClientConfig::default());
    let err = socket
        .read(ReadOptions {
            client: Some(3),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfRange);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_refused_reports_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let socket = TcpSocket::new(ClientConfig::default());
    let err = socket.connect(connect_opts(addr)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connect);
    assert!(socket.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_on_one_handle_do_not_interleave() {
    let addr = spawn_echo_server().await;
    let socket = Arc::new(TcpSocket::new(ClientConfig::default()));
    let client = socket.connect(connect_opts(addr)).await.unwrap().client;

    let mut senders = Vec::new();
    for ch in ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h'] {
        let socket = Arc::clone(&socket);
        senders.push(tokio::spawn(async move {
            socket
                .send(SendOptions {
                    client: Some(client),
                    data: ch.to_string().repeat(4),
                    ..Default::default()
                })
                .await
        }));
    }
    for s in senders {
        s.await.unwrap().unwrap();
    }

    let mut echoed = String::new();
    while echoed.len() < 32 {
        let read = socket
            .read(ReadOptions {
                client: Some(client),
                expect_len: Some(64),
                timeout: Some(5),
                ..Default::default()
            })
            .await
            .unwrap();
        echoed.push_str(&read.result);
    }

    let mut chunks: Vec<String> = echoed
        .as_bytes()
        .chunks(4)
        .map(|c| String::from_utf8(c.to_vec()).unwrap())
        .collect();
    for chunk in &chunks {
        assert!(chunk.chars().all(|c| Some(c) == chunk.chars().next()), "interleaved: {echoed}");
    }
    chunks.sort();
    chunks.dedup();
    assert_eq!(chunks.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_closes_everything() {
    let addr = spawn_echo_server().await;
    let socket = TcpSocket::new(ClientConfig::default());
    socket.connect(connect_opts(addr)).await.unwrap();
    socket.connect(connect_opts(addr)).await.unwrap();

    socket.shutdown().await;

    let counts = socket.registry().counts();
    assert_eq!((counts.total, counts.live), (2, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_reads_do_not_starve_other_handles() {
    let addr = spawn_echo_server().await;
    let config = ClientConfig::default();
    let workers = config.workers;
    let socket = Arc::new(TcpSocket::new(config));

    let mut clients = Vec::new();
    for _ in 0..=workers {
        clients.push(socket.connect(connect_opts(addr)).await.unwrap().client);
    }

    // 応答の来ない read を worker 数だけ待たせる（timeout なし）
    let mut parked = Vec::new();
    for &client in &clients[..workers] {
        let socket = Arc::clone(&socket);
        parked.push(tokio::spawn(async move {
            socket
                .read(ReadOptions {
                    client: Some(client),
                    ..Default::default()
                })
                .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let last = clients[workers];
    tokio::time::timeout(
        Duration::from_secs(2),
        socket.send(SendOptions {
            client: Some(last),
            data: "ping".into(),
            ..Default::default()
        }),
    )
    .await
    .expect("send stalled behind idle reads")
    .unwrap();
    let echoed = tokio::time::timeout(
        Duration::from_secs(2),
        socket.read(ReadOptions {
            client: Some(last),
            expect_len: Some(4),
            timeout: Some(2),
            ..Default::default()
        }),
    )
    .await
    .expect("read stalled behind idle reads")
    .unwrap();
    assert_eq!(echoed.result, "ping");

    let extra = tokio::time::timeout(Duration::from_secs(2), socket.connect(connect_opts(addr)))
        .await
        .expect("connect stalled behind idle reads")
        .unwrap();
    assert_eq!(extra.client, i64::try_from(workers + 1).unwrap());
    assert!(parked.iter().all(|p| !p.is_finished()));

    // shutdown が待機中の read を起こす
    socket.shutdown().await;
    for p in parked {
        tokio::time::timeout(Duration::from_secs(2), p)
            .await
            .expect("parked read not released by shutdown")
            .unwrap()
            .ok();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connect_racing_shutdown_leaves_nothing_live() {
    let addr = spawn_echo_server().await;

    for _ in 0..20 {
        let socket = Arc::new(TcpSocket::new(ClientConfig::default()));
        let connecting = {
            let socket = Arc::clone(&socket);
            tokio::spawn(async move { socket.connect(connect_opts(addr)).await })
        };
        tokio::task::yield_now().await;
        socket.shutdown().await;

        if let Err(err) = connecting.await.unwrap() {
            assert_eq!(err.kind(), ErrorKind::Shutdown);
        }
        assert_eq!(socket.registry().counts().live, 0);
    }
}
