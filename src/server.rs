//! Unix-socket request server feeding the worker pool.
//!
//! The server accepts connections on a local stream socket and hands each
//! one to the thread pool as a job: read the request, dispatch it, write
//! the response followed by a terminating `\0`, close. The accept loop
//! waits with a short poll timeout so it can observe its stop flag; a
//! request consisting of a single `\0` is a health check answered with a
//! single `\0` without touching the dispatcher.

use std::{
    fs,
    io::{Read, Write},
    os::fd::{AsFd, AsRawFd},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, PollTimeout, poll},
    sys::socket::{AddressFamily, Backlog, SockFlag, SockType, UnixAddr, bind, listen, socket},
};
use tracing::{error, info, trace};

use crate::{
    constants::{
        ACCEPT_POLL_INTERVAL, MAX_WAITING_REQUESTS, THREAD_POOL_CONCURRENCY,
        THREAD_POOL_QUEUE_CAPACITY,
    },
    error::ServerError,
    pool::ThreadPool,
    protocol::Dispatcher,
};

const TRACE_NAME: &str = "socket_server";

/// Background request server over a unix-domain stream socket.
pub struct Server {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Server {
    /// Binds the socket (replacing any stale file) and starts the accept
    /// loop on a dedicated thread.
    pub fn spawn(
        socket_path: impl Into<PathBuf>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self, ServerError> {
        let socket_path = socket_path.into();
        let listener = bind_listener(&socket_path)?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || accept_loop(&listener, &dispatcher, &flag));

        info!("Socket server started on {:?}", socket_path);
        Ok(Server {
            running,
            handle: Some(handle),
        })
    }

    /// Asks the accept loop to exit; it notices within one poll tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Waits for the accept loop to drain its pool and exit.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            info!("Socket server stopped");
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

fn bind_listener(socket_path: &Path) -> Result<UnixListener, ServerError> {
    let fd = socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::empty(),
        None,
    )?;

    let addr = UnixAddr::new(socket_path)?;
    let _ = fs::remove_file(socket_path);
    bind(fd.as_raw_fd(), &addr)?;
    listen(&fd, Backlog::new(MAX_WAITING_REQUESTS)?)?;

    let listener = UnixListener::from(fd);
    listener.set_nonblocking(true)?;
    Ok(listener)
}

fn accept_loop(listener: &UnixListener, dispatcher: &Arc<Dispatcher>, running: &AtomicBool) {
    let pool = ThreadPool::new(
        THREAD_POOL_CONCURRENCY,
        THREAD_POOL_QUEUE_CAPACITY,
        TRACE_NAME,
    );
    if let Err(err) = pool.start() {
        error!("Unable to start the request pool: {err}");
        return;
    }

    while running.load(Ordering::SeqCst) {
        let mut fds = [PollFd::new(listener.as_fd(), PollFlags::POLLIN)];
        let timeout = PollTimeout::from(ACCEPT_POLL_INTERVAL.as_millis() as u16);
        match poll(&mut fds, timeout) {
            Ok(0) => continue,
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(err) => {
                error!("Accept poll failed: {err}");
                break;
            }
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }

        match listener.accept() {
            Ok((stream, _addr)) => {
                trace!("Accepted socket connection");
                let dispatcher = Arc::clone(dispatcher);
                if let Err(err) =
                    pool.queue("client", move || handle_client(&dispatcher, stream))
                {
                    error!("Unable to queue client request: {err}");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(err) => error!("Unable to accept connection: {err}"),
        }
    }

    info!("Socket server stopping");
    if let Err(err) = pool.finish_and_stop() {
        error!("Unable to stop the request pool: {err}");
    }
}

fn handle_client(dispatcher: &Dispatcher, mut stream: UnixStream) {
    // The accepted stream must block; the listener's nonblocking mode is
    // only for the poll-driven accept loop.
    let _ = stream.set_nonblocking(false);

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            error!("Unable to read client request: {err}");
            return;
        }
    };

    let response = if request.is_empty() {
        trace!("Received health check");
        String::new()
    } else {
        let input = String::from_utf8_lossy(&request);
        trace!("Received command '{input}'");
        dispatcher.dispatch(&input)
    };

    let result = stream
        .write_all(response.as_bytes())
        .and_then(|()| stream.write_all(&[0]));
    if let Err(err) = result {
        error!("Unable to write response: {err}");
    }

    trace!("Closing socket connection");
}

/// Reads until the connection closes or an in-band `\0` terminator; the
/// terminator is not part of the request.
fn read_request(stream: &mut UnixStream) -> std::io::Result<Vec<u8>> {
    let mut request = Vec::new();
    let mut buffer = [0u8; 1024];

    loop {
        let len = stream.read(&mut buffer)?;
        if len == 0 {
            break;
        }
        if let Some(pos) = buffer[..len].iter().position(|byte| *byte == 0) {
            request.extend_from_slice(&buffer[..pos]);
            break;
        }
        request.extend_from_slice(&buffer[..len]);
    }

    Ok(request)
}
