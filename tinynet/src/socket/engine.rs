use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::sync::{Mailbox, Oneshot};
use crate::time::Clock;

use super::{Error, Reply, Request, Result, Sockets, Stack};

/// Longest the engine sleeps without looking at its devices.
///
/// Devices have no way to wake the engine, a datagram injected from outside waits at most this
/// long.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How often a caller parked on its answer checks that the engine is still there.
const LIVENESS_CHECK: Duration = Duration::from_millis(100);

pub(super) enum Message {
    Call {
        request: Request,
        reply: Arc<Oneshot<Result<Reply>>>,
    },
    Shutdown,
}

/// What the engine thread and its clients share.
pub(super) struct Shared {
    mailbox: Mailbox<Message>,
    running: AtomicBool,
}

/// A stack running on its own thread.
///
/// Requests arrive through a bounded mailbox and are executed one at a time, interleaved with
/// timers and received datagrams. The thread ends when [`shutdown`] is called, when the engine is
/// dropped or when the last [`Sockets`] handle is gone.
///
/// [`shutdown`]: #method.shutdown
/// [`Sockets`]: struct.Sockets.html
pub struct Engine {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<Stack>>,
}

impl Shared {
    pub(super) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Carry one request to the engine and block until it was executed.
    pub(super) fn call(&self, request: Request) -> Result<Reply> {
        let reply = Arc::new(Oneshot::new());
        let mut message = Message::Call { request, reply: Arc::clone(&reply) };
        loop {
            if !self.is_running() {
                return Err(Error::System);
            }
            match self.mailbox.send(message, Some(LIVENESS_CHECK)) {
                Ok(()) => break,
                Err(back) => message = back,
            }
        }
        loop {
            if let Some(result) = reply.wait(Some(LIVENESS_CHECK)) {
                return result;
            }
            if !self.is_running() {
                return Err(Error::System);
            }
        }
    }

    /// Ask the engine to stop, without waiting for it.
    pub(super) fn stop(&self) {
        while self.is_running() {
            if self.mailbox.send(Message::Shutdown, Some(LIVENESS_CHECK)).is_ok() {
                break;
            }
        }
    }
}

impl Engine {
    /// Move `stack` onto a new thread.
    ///
    /// Returns the engine and the first client handle, clone it for more threads.
    pub fn spawn(stack: Stack) -> Result<(Engine, Sockets)> {
        let dns = stack.config().dns.clone();
        let shared = Arc::new(Shared {
            mailbox: Mailbox::new(stack.config().mailbox),
            running: AtomicBool::new(true),
        });
        let engine_side = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("tinynet".into())
            .spawn(move || run(stack, engine_side))
            .map_err(|err| {
                net_warn!("engine: cannot start thread: {}", err);
                Error::System
            })?;
        let sockets = Sockets::new(Arc::clone(&shared), &dns);
        Ok((Engine { shared, thread: Some(thread) }, sockets))
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Stop the engine and take the stack back.
    ///
    /// Calls still queued are answered with `Error::System`. `None` if the engine thread panicked.
    pub fn shutdown(mut self) -> Option<Stack> {
        self.join()
    }

    fn join(&mut self) -> Option<Stack> {
        let thread = self.thread.take()?;
        self.shared.stop();
        thread.join().ok()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.join();
    }
}

/// The engine loop.
fn run(mut stack: Stack, shared: Arc<Shared>) -> Stack {
    let clock = Clock::new();
    net_debug!("engine: running");
    loop {
        let now = clock.now();
        let timeout = stack.next_deadline()
            .map(|deadline| deadline.saturating_since(now))
            .map_or(POLL_INTERVAL, |due| due.min(POLL_INTERVAL));

        match shared.mailbox.recv(Some(timeout)) {
            Some(Message::Call { request, reply }) => {
                reply.put(stack.execute(request));
            }
            Some(Message::Shutdown) => break,
            None => (),
        }
        stack.advance(clock.now());
        stack.poll();
    }

    shared.running.store(false, Ordering::Release);
    while let Some(message) = shared.mailbox.recv(Some(Duration::from_millis(0))) {
        if let Message::Call { reply, .. } = message {
            reply.put(Err(Error::System));
        }
    }
    net_debug!("engine: stopped");
    stack
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::socket::{Response, SockType};

    #[test]
    fn executes_and_stops() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (engine, sockets) = Engine::spawn(Stack::new(Config::default())).unwrap();
        assert!(engine.is_running());
        let reply = sockets.shared().call(Request::Create { ty: SockType::Dgram, protocol: 0 });
        assert!(matches!(reply, Ok(Reply::Done(Response::Socket(_)))));

        let stack = engine.shutdown().unwrap();
        assert_eq!(stack.handles().used(), 1);
        let reply = sockets.shared().call(Request::Create { ty: SockType::Dgram, protocol: 0 });
        assert!(matches!(reply, Err(Error::System)));
    }

    #[test]
    fn last_client_stops_engine() {
        let (engine, sockets) = Engine::spawn(Stack::new(Config::default())).unwrap();
        let other = sockets.clone();
        drop(sockets);
        assert!(engine.is_running());
        drop(other);
        for _ in 0..100 {
            if !engine.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!engine.is_running());
        assert!(engine.shutdown().is_some());
    }
}
