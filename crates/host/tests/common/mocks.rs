//! `mockall` doubles for the transport seam.

use dbgnoc_host::Result;
use dbgnoc_host::backend::{Backend, Packet};
use mockall::mock;

mock! {
    pub Transport {}
    impl Backend for Transport {
        fn connect(&mut self) -> Result<()>;
        fn disconnect(&mut self) -> Result<()>;
        fn send(&mut self, packet: &Packet) -> Result<()>;
        fn try_receive(&mut self) -> Result<Option<Packet>>;
    }
}

/// A backend that connects and accepts every packet but never answers.
pub fn silent_backend() -> MockTransport {
    let mut backend = MockTransport::new();
    let _ = backend.expect_connect().returning(|| Ok(()));
    let _ = backend.expect_send().returning(|_| Ok(()));
    let _ = backend.expect_try_receive().returning(|| Ok(None));
    backend
}
