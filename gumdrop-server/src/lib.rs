//! Reactor-per-thread connection server: each worker thread runs its own single-threaded async
//! executor and drives every connection it accepts through a pluggable [`Handler`] for its
//! entire lifetime.

#![forbid(unsafe_code)]

mod builder;
mod connection;
mod handler;
mod server;
mod signals;
mod worker;

pub mod net;

pub use builder::Builder;
pub use handler::{CloseReason, Handler, SendResult, Sender};
pub use server::{ServerFuture, ServerHandle};

#[cfg(test)]
mod test {
    use std::{
        io,
        net::SocketAddr,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use crate::{Builder, CloseReason, Handler, SendResult, Sender};

    struct Echo;

    impl Handler for Echo {
        fn on_open(&mut self, _sender: &mut dyn Sender) {}

        fn on_data(&mut self, sender: &mut dyn Sender, data: &[u8]) {
            let _ = sender.send(data);
        }

        fn on_writable(&mut self, _sender: &mut dyn Sender) {}

        fn on_close(&mut self, _reason: CloseReason) {}

        fn on_error(&mut self, _sender: &mut dyn Sender, _error: &io::Error) {}
    }

    #[test]
    fn builder_accepts_a_handler_factory() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let _server = Builder::new().worker_threads(1).listen("echo", listener, || Echo).unwrap().build();
    }

    struct CountingSender {
        peer: SocketAddr,
        local: SocketAddr,
        sent: Arc<AtomicUsize>,
    }

    impl Sender for CountingSender {
        fn send(&mut self, bytes: &[u8]) -> SendResult {
            self.sent.fetch_add(bytes.len(), Ordering::SeqCst);
            SendResult::Ok
        }

        fn close(&mut self) {}

        fn peer_addr(&self) -> SocketAddr {
            self.peer
        }

        fn local_addr(&self) -> SocketAddr {
            self.local
        }
    }

    #[test]
    fn handler_can_echo_through_a_stub_sender() {
        let sent = Arc::new(AtomicUsize::new(0));
        let mut sender = CountingSender {
            peer: "127.0.0.1:1".parse().unwrap(),
            local: "127.0.0.1:2".parse().unwrap(),
            sent: sent.clone(),
        };
        let mut echo = Echo;
        echo.on_data(&mut sender, b"hello");
        assert_eq!(sent.load(Ordering::SeqCst), 5);
    }
}
