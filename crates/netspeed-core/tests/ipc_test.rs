#![cfg(unix)]
#![allow(clippy::unwrap_used)]

mod common;

use std::path::Path;
use std::time::Duration;

use common::{FakeLink, Harness};
use netspeed_core::ipc::{ControlServer, SocketTransport};
use netspeed_core::{
    Configuration, KeepaliveHost, ReconnectConfig, Reply, Request, RpcError, ServiceController,
    ServiceHost, ServiceMode, Signal, Transport,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Daemon {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Daemon {
    fn spawn(path: &Path, host: ServiceHost) -> Self {
        let server = ControlServer::bind(path, host).unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.serve(cancel.clone()));
        Self { cancel, task }
    }

    async fn kill(self) {
        self.cancel.cancel();
        self.task.await.unwrap();
    }
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually(mut check: impl AsyncFnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn calls_round_trip_over_the_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctl.sock");
    let h = Harness::new(Configuration::default(), FakeLink::new(0, 0));
    let daemon = Daemon::spawn(&path, h.host.clone());

    let transport = SocketTransport::new(&path);
    let Reply::Status(report) = transport.call(Request::Status).await.unwrap() else {
        panic!("expected status");
    };
    assert_eq!(report.state.mode, ServiceMode::Stopped);

    let controller = ServiceController::new(transport.clone(), h.store.clone());
    controller.start_service(true).await.unwrap();
    let report = controller.status().await.unwrap();
    assert_eq!(report.bindings, 1);
    assert!(report.started_at.is_some());
    assert!(eventually(async || h.host.state().await.mode == ServiceMode::ForegroundVisible).await);

    controller.stop_service().await.unwrap();
    assert_eq!(h.host.state().await.mode, ServiceMode::Stopped);

    daemon.kill().await;
    assert!(!path.exists());
}

#[tokio::test]
async fn stale_binding_is_reported_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctl.sock");
    let h = Harness::new(Configuration::default(), FakeLink::new(0, 0));
    let _daemon = Daemon::spawn(&path, h.host.clone());

    let err = SocketTransport::new(&path)
        .call(Request::UpdateConfiguration {
            binding: netspeed_core::BindingId(99),
            configuration: Configuration::default(),
        })
        .await
        .unwrap_err();
    assert!(err.is_unreachable());
}

#[tokio::test]
async fn subscription_streams_signals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctl.sock");
    let h = Harness::new(Configuration::default(), FakeLink::new(0, 0));
    let _daemon = Daemon::spawn(&path, h.host.clone());

    let mut signals = SocketTransport::new(&path).subscribe(false).await.unwrap();
    assert!(!h.host.keepalive_active());

    h.host.bus().publish(Signal::ScreenOff);
    assert_eq!(signals.recv().await, Some(Signal::ScreenOff));
}

#[tokio::test]
async fn keepalive_subscription_holds_the_permission() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctl.sock");
    let h = Harness::new(Configuration::default(), FakeLink::new(0, 0));
    let _daemon = Daemon::spawn(&path, h.host.clone());

    let signals = SocketTransport::new(&path).subscribe(true).await.unwrap();
    assert!(h.host.keepalive_active());

    drop(signals);
    assert!(eventually(async || !h.host.keepalive_active()).await);
}

#[tokio::test]
async fn malformed_frame_gets_protocol_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctl.sock");
    let h = Harness::new(Configuration::default(), FakeLink::new(0, 0));
    let _daemon = Daemon::spawn(&path, h.host.clone());

    let stream = UnixStream::connect(&path).await.unwrap();
    let (read, mut write) = stream.into_split();
    write.write_all(b"{\"v\":1,\"body\":42}\n").await.unwrap();
    let mut line = String::new();
    BufReader::new(read).read_line(&mut line).await.unwrap();

    let frame: netspeed_core::ipc::ServerFrame =
        netspeed_core::ipc::wire::decode(line.trim_end()).unwrap();
    assert!(matches!(
        frame,
        netspeed_core::ipc::ServerFrame::Error {
            error: RpcError::Protocol(_)
        }
    ));
}

#[tokio::test]
async fn bind_replaces_stale_socket_but_not_other_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctl.sock");
    let h = Harness::new(Configuration::default(), FakeLink::new(0, 0));

    // A daemon that died without cleaning up.
    drop(ControlServer::bind(&path, h.host.clone()).unwrap());
    assert!(path.exists());
    let daemon = Daemon::spawn(&path, h.host.clone());
    assert!(SocketTransport::new(&path).call(Request::Status).await.is_ok());
    daemon.kill().await;

    let file = dir.path().join("notes.txt");
    std::fs::write(&file, "keep me").unwrap();
    assert!(ControlServer::bind(&file, h.host.clone()).is_err());
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "keep me");
}

#[tokio::test]
async fn keepalive_host_reattaches_after_daemon_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctl.sock");
    let first = Harness::new(Configuration::default(), FakeLink::new(0, 0));
    let daemon = Daemon::spawn(&path, first.host.clone());

    let cancel = CancellationToken::new();
    let keepalive = KeepaliveHost::new(SocketTransport::new(&path), first.store.clone())
        .with_reconnect(ReconnectConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
        });
    let task = tokio::spawn(keepalive.run(cancel.clone()));

    assert!(eventually(async || first.host.state().await.mode == ServiceMode::BackgroundBound).await);

    daemon.kill().await;
    first.host.shutdown().await;

    let second = Harness::new(Configuration::default(), FakeLink::new(0, 0));
    let _daemon = Daemon::spawn(&path, second.host.clone());
    assert!(eventually(async || second.host.state().await.mode == ServiceMode::BackgroundBound).await);
    assert!(second.host.keepalive_active());

    cancel.cancel();
    task.await.unwrap();
}
