#[path = "common/mod.rs"]
mod common;

use std::{
    io::{Read, Write},
    os::unix::net::UnixStream,
    path::Path,
    sync::Arc,
    thread,
    time::Duration,
};

use conc::{driver::Driver, manager::Manager, protocol::Dispatcher, server::Server};
use tempfile::tempdir;

use common::adopt_child_signal_dispositions;

fn spawn_server(dir: &Path) -> (Server, std::path::PathBuf) {
    let manager = Manager::new(Driver::new(dir.join("projects")));
    manager.init().unwrap();
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(manager)));

    let socket_path = dir.join("conc.sock");
    let server = Server::spawn(&socket_path, dispatcher).unwrap();
    (server, socket_path)
}

/// One protocol exchange: connect, send the request bytes, read until the
/// `\0` terminator, return the bytes before it.
fn roundtrip(socket_path: &Path, request: &[u8]) -> Vec<u8> {
    let mut stream = UnixStream::connect(socket_path).unwrap();
    stream.write_all(request).unwrap();
    stream.write_all(&[0]).unwrap();

    let mut response = Vec::new();
    let mut buffer = [0u8; 1024];
    loop {
        let len = stream.read(&mut buffer).unwrap();
        if len == 0 {
            break;
        }
        if let Some(pos) = buffer[..len].iter().position(|byte| *byte == 0) {
            response.extend_from_slice(&buffer[..pos]);
            return response;
        }
        response.extend_from_slice(&buffer[..len]);
    }
    panic!("connection closed without a \\0 terminator");
}

#[test]
fn health_check_answers_with_a_single_null() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let (mut server, socket_path) = spawn_server(temp.path());

    let mut stream = UnixStream::connect(&socket_path).unwrap();
    stream.write_all(&[0]).unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).unwrap();
    assert_eq!(reply, vec![0]);

    // The server is still accepting afterwards.
    let response = roundtrip(&socket_path, b"PROJECTS-NAMES");
    assert_eq!(response, b"OK");

    server.stop();
    server.join();
}

#[test]
fn requests_flow_end_to_end_over_the_socket() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let (mut server, socket_path) = spawn_server(temp.path());

    let upsert = b"PROJECT-UPSERT\n{\"name\":\"demo\",\"cwd\":\"/tmp\",\"services\":[{\"name\":\"svc\",\"command\":[\"/bin/sleep\",\"60\"]}]}";
    assert_eq!(roundtrip(&socket_path, upsert), b"OK\nsvc IDLE 0 -");

    let start = String::from_utf8(roundtrip(&socket_path, b"SERVICE-START\ndemo\nsvc")).unwrap();
    assert!(start.starts_with("OK\nsvc RUNNING "), "got: {start}");

    let stop = String::from_utf8(roundtrip(&socket_path, b"SERVICE-STOP\ndemo\nsvc")).unwrap();
    assert!(stop.starts_with("OK\nsvc STOPPED "), "got: {stop}");

    assert_eq!(
        roundtrip(&socket_path, b"PROJECT-INFO\nmissing"),
        b"ERROR\nproject_not_found"
    );

    server.stop();
    server.join();
}

#[test]
fn requests_terminated_by_close_are_served_too() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let (mut server, socket_path) = spawn_server(temp.path());

    // No in-band \0; the request ends when the write side shuts down.
    let mut stream = UnixStream::connect(&socket_path).unwrap();
    stream.write_all(b"PROJECTS-NAMES").unwrap();
    stream.shutdown(std::net::Shutdown::Write).unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).unwrap();
    assert_eq!(reply, b"OK\0");

    server.stop();
    server.join();
}

#[test]
fn concurrent_clients_are_all_served() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let (mut server, socket_path) = spawn_server(temp.path());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let socket_path = socket_path.clone();
            thread::spawn(move || roundtrip(&socket_path, b"PROJECTS-NAMES"))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), b"OK");
    }

    server.stop();
    server.join();
}

#[test]
fn stop_shuts_the_listener_down_within_a_tick() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let (mut server, socket_path) = spawn_server(temp.path());

    server.stop();
    server.join();

    // The socket file may linger, but nothing is listening anymore.
    thread::sleep(Duration::from_millis(50));
    match UnixStream::connect(&socket_path) {
        Err(_) => {}
        Ok(mut stream) => {
            // At most a stale backlog entry; no worker ever answers.
            let _ = stream.write_all(b"PROJECTS-NAMES\0");
            let mut reply = Vec::new();
            let read = stream.read_to_end(&mut reply).unwrap_or(0);
            assert_eq!(read, 0, "no response should arrive after stop");
        }
    }
}
