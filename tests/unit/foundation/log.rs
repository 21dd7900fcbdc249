use std::io::Write;
use std::sync::{Arc, Mutex};

use super::*;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn injected_dispatch_receives_events() {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let logger = Logger::new(tracing::Dispatch::new(subscriber));

    logger.scope(|| tracing::info!(answer = 42, "hello from scope"));

    let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    assert!(text.contains("hello from scope"));
    assert!(text.contains("answer=42"));
}

#[test]
fn silent_logger_runs_closure() {
    let logger = Logger::silent();
    assert_eq!(logger.scope(|| 7), 7);
    assert!(format!("{logger:?}").contains("injected: true"));
}
