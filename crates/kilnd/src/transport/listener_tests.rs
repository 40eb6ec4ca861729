//! Tests for the socket listener.

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use kiln_config::SocketEndpoint;

use super::listener::SocketListener;
use super::{ConnectionHandler, ListenerError, RequestLineRecorder};

#[fixture]
fn tcp_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", 0)
}

fn wait_for_lines(recorder: &RequestLineRecorder, expected: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if recorder.lines().len() >= expected {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[rstest]
fn tcp_listener_hands_each_connection_to_the_handler(tcp_endpoint: SocketEndpoint) {
    let listener = SocketListener::bind(&tcp_endpoint).expect("bind tcp listener");
    let addr = listener
        .local_addr()
        .expect("listener should report local address");
    let recorder = RequestLineRecorder::shared();
    let handler: Arc<dyn ConnectionHandler> = recorder.clone();
    let handle = listener.start(handler).expect("start listener");

    for request in [r#"{"kind":"compiler_id"}"#, r#"{"kind":"shutdown"}"#] {
        let mut client = TcpStream::connect(addr).expect("connect client");
        writeln!(client, "{request}").expect("send request line");
    }

    assert!(wait_for_lines(&recorder, 2), "expected two connections");
    let mut lines = recorder.lines();
    lines.sort();
    assert_eq!(
        lines,
        [r#"{"kind":"compiler_id"}"#, r#"{"kind":"shutdown"}"#]
    );
    handle.shutdown();
    handle.join().expect("join listener");
}

#[cfg(unix)]
#[fixture]
fn unix_tempdir() -> tempfile::TempDir {
    tempfile::tempdir().expect("temp dir")
}

#[cfg(unix)]
#[rstest]
fn unix_listener_replaces_stale_socket_and_cleans_up(unix_tempdir: tempfile::TempDir) {
    let path = unix_tempdir.path().join("kilnd.sock");
    {
        let _stale = std::os::unix::net::UnixListener::bind(&path).expect("bind stale listener");
    }
    assert!(path.exists(), "stale socket should remain");

    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
    let listener = SocketListener::bind(&endpoint).expect("bind new listener");
    assert_eq!(listener.endpoint(), &endpoint);
    let recorder = RequestLineRecorder::shared();
    let handle = listener.start(recorder.clone()).expect("start listener");

    let mut client = std::os::unix::net::UnixStream::connect(&path).expect("connect unix client");
    writeln!(client, r#"{{"kind":"compiler_id"}}"#).expect("send request line");
    assert!(wait_for_lines(&recorder, 1), "expected one connection");

    handle.shutdown();
    handle.join().expect("join listener");
    assert!(
        !path.exists(),
        "listener should remove unix socket on shutdown"
    );
}

#[cfg(unix)]
#[rstest]
fn unix_listener_rejects_in_use_socket(unix_tempdir: tempfile::TempDir) {
    let path = unix_tempdir.path().join("kilnd.sock");
    let _existing = std::os::unix::net::UnixListener::bind(&path).expect("bind existing listener");

    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
    let error = SocketListener::bind(&endpoint).expect_err("should fail bind");
    assert!(matches!(error, ListenerError::SocketInUse { .. }));
}

#[cfg(unix)]
#[rstest]
fn unix_listener_refuses_to_replace_regular_files(unix_tempdir: tempfile::TempDir) {
    let path = unix_tempdir.path().join("kilnd.sock");
    std::fs::write(&path, b"not a socket").expect("write regular file");

    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
    let error = SocketListener::bind(&endpoint).expect_err("should fail bind");
    assert!(matches!(error, ListenerError::NotASocket { .. }));
    assert!(path.exists(), "regular file must be left alone");
}
