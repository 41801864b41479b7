//! Capture of output written to the process-global logging destination
//!
//! Third-party crates log through the global `tracing` dispatcher (or the `log` facade),
//! which the application cannot point anywhere in particular. A [`RedirectableSink`] aims
//! that destination at a [`BridgeWriter`]; one background thread reads the resulting byte
//! stream and forwards every chunk to the logging core.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::LogError;

/// Tag prefixed to every forwarded chunk
pub const SYS_LOG_TAG: &str = "[SYS LOG]";

/// Size of a single read from the byte stream
pub const READ_BUFFER_SIZE: usize = 2048;

#[derive(Debug, Default)]
struct Pipe {
    tx: Mutex<Option<Sender<Vec<u8>>>>,
}

/// Write half of the bridge byte stream
///
/// Cheap to clone; all clones feed the same reader. Writes after [`BridgeWriter::close`]
/// fail with [`io::ErrorKind::BrokenPipe`].
#[derive(Debug, Clone)]
pub struct BridgeWriter {
    pipe: Arc<Pipe>,
}

impl BridgeWriter {
    /// Close the stream; the reader sees end-of-stream once buffered chunks are drained
    pub fn close(&self) {
        let mut tx = self.pipe.tx.lock().unwrap_or_else(|e| e.into_inner());
        tx.take();
    }

    /// Whether the stream has been closed
    pub fn is_closed(&self) -> bool {
        self.pipe
            .tx
            .lock()
            .map(|tx| tx.is_none())
            .unwrap_or(true)
    }
}

impl Write for BridgeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let tx = self.pipe.tx.lock().unwrap_or_else(|e| e.into_inner());
        match tx.as_ref() {
            Some(tx) if tx.send(buf.to_vec()).is_ok() => Ok(buf.len()),
            _ => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for BridgeWriter {
    type Writer = BridgeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Read half of the bridge byte stream
///
/// Each read returns bytes from at most one write; a write larger than the read buffer
/// is returned over several reads.
#[derive(Debug)]
pub struct BridgeReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl Read for BridgeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.offset >= self.pending.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                Err(_) => return Ok(0),
            }
        }

        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}

/// Create a connected writer/reader pair
pub fn byte_stream() -> (BridgeWriter, BridgeReader) {
    let (tx, rx) = mpsc::channel();
    let writer = BridgeWriter {
        pipe: Arc::new(Pipe {
            tx: Mutex::new(Some(tx)),
        }),
    };
    let reader = BridgeReader {
        rx,
        pending: Vec::new(),
        offset: 0,
    };
    (writer, reader)
}

/// Strip one trailing line terminator (`\n` or `\r\n`)
pub fn strip_line_terminator(text: &str) -> &str {
    text.strip_suffix('\n')
        .map(|t| t.strip_suffix('\r').unwrap_or(t))
        .unwrap_or(text)
}

/// Take the text in `pending` up to any incomplete trailing UTF-8 sequence
///
/// The incomplete tail stays in `pending`. Invalid bytes elsewhere become U+FFFD.
fn take_complete_utf8(pending: &mut Vec<u8>) -> String {
    let cut = match std::str::from_utf8(pending.as_slice()) {
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        _ => pending.len(),
    };
    let tail = pending.split_off(cut);
    let text = String::from_utf8_lossy(pending.as_slice()).into_owned();
    *pending = tail;
    text
}

/// Background consumer of the bridge byte stream
#[derive(Debug)]
pub struct StandardLogBridge {
    writer: BridgeWriter,
    handle: Option<JoinHandle<()>>,
}

impl StandardLogBridge {
    /// Start the consumer thread
    ///
    /// `forward` receives each chunk with a single trailing terminator removed. Chunks are
    /// not re-assembled into lines: one chunk may hold several lines or part of one. A
    /// character cut by the read buffer is held back and sent with the next chunk.
    pub fn spawn<F>(
        writer: BridgeWriter,
        mut reader: BridgeReader,
        forward: F,
    ) -> Result<Self, LogError>
    where
        F: Fn(&str) + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("rotolog-bridge".to_string())
            .spawn(move || {
                let mut buf = [0u8; READ_BUFFER_SIZE];
                let mut pending = Vec::new();
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            pending.extend_from_slice(&buf[..n]);
                            let chunk = take_complete_utf8(&mut pending);
                            if !chunk.is_empty() {
                                forward(strip_line_terminator(&chunk));
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
                if !pending.is_empty() {
                    forward(&String::from_utf8_lossy(&pending));
                }
            })
            .map_err(LogError::SpawnBridge)?;

        Ok(Self {
            writer,
            handle: Some(handle),
        })
    }

    /// Writable handle feeding the consumer
    pub fn writer(&self) -> &BridgeWriter {
        &self.writer
    }

    /// Close the stream and wait for the consumer to drain it
    pub fn shutdown(&mut self) {
        self.writer.close();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Log bridge thread panicked");
            }
        }
    }

    /// Whether the consumer thread is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for StandardLogBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A global logging destination that can be pointed at the bridge
pub trait RedirectableSink: Send + Sync {
    /// Human-readable name used in failure messages
    fn name(&self) -> &'static str;

    /// Send everything written to the global destination into `writer`
    fn redirect(&self, writer: BridgeWriter) -> Result<(), LogError>;
}

/// Installs the process-global `tracing` subscriber, which also receives `log` records
///
/// Lines are written without timestamps since the core adds its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl RedirectableSink for TracingSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn redirect(&self, writer: BridgeWriter) -> Result<(), LogError> {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .without_time()
            .log_internal_errors(false);

        tracing_subscriber::registry()
            .with(layer)
            .try_init()
            .map_err(|e| LogError::Redirect {
                sink: self.name(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn collecting_bridge() -> (StandardLogBridge, Arc<StdMutex<Vec<String>>>) {
        let collected = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        let (writer, reader) = byte_stream();
        let bridge = StandardLogBridge::spawn(writer, reader, move |chunk| {
            sink.lock().unwrap().push(chunk.to_string());
        })
        .unwrap();
        (bridge, collected)
    }

    #[test]
    fn test_strip_line_terminator() {
        assert_eq!(strip_line_terminator("hello\n"), "hello");
        assert_eq!(strip_line_terminator("hello\r\n"), "hello");
        assert_eq!(strip_line_terminator("hello\n\n"), "hello\n");
        assert_eq!(strip_line_terminator("hello"), "hello");
        assert_eq!(strip_line_terminator("\n"), "");
    }

    #[test]
    fn test_forwards_single_line() {
        let (mut bridge, collected) = collecting_bridge();
        bridge.writer().clone().write_all(b"hello\n").unwrap();
        bridge.shutdown();

        assert_eq!(*collected.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_multiple_lines_in_one_write_stay_one_chunk() {
        let (mut bridge, collected) = collecting_bridge();
        bridge.writer().clone().write_all(b"first\nsecond\n").unwrap();
        bridge.shutdown();

        assert_eq!(*collected.lock().unwrap(), vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn test_partial_line_writes_are_forwarded_separately() {
        let (mut bridge, collected) = collecting_bridge();
        let mut writer = bridge.writer().clone();
        writer.write_all(b"hel").unwrap();
        writer.write_all(b"lo\n").unwrap();
        bridge.shutdown();

        assert_eq!(
            *collected.lock().unwrap(),
            vec!["hel".to_string(), "lo".to_string()]
        );
    }

    #[test]
    fn test_large_write_is_fragmented_by_read_buffer() {
        let (mut bridge, collected) = collecting_bridge();
        let payload = vec![b'x'; READ_BUFFER_SIZE * 2 + 10];
        bridge.writer().clone().write_all(&payload).unwrap();
        bridge.shutdown();

        let chunks = collected.lock().unwrap();
        let sizes: Vec<usize> = chunks.iter().map(String::len).collect();
        assert_eq!(sizes, vec![READ_BUFFER_SIZE, READ_BUFFER_SIZE, 10]);
    }

    #[test]
    fn test_fragmented_multibyte_character_is_not_split() {
        let (mut bridge, collected) = collecting_bridge();
        let mut payload = "x".repeat(READ_BUFFER_SIZE - 1);
        payload.push_str("é\n");
        bridge.writer().clone().write_all(payload.as_bytes()).unwrap();
        bridge.shutdown();

        assert_eq!(
            *collected.lock().unwrap(),
            vec!["x".repeat(READ_BUFFER_SIZE - 1), "é".to_string()]
        );
    }

    #[test]
    fn test_take_complete_utf8() {
        let mut pending = vec![b'a', 0xC3];
        assert_eq!(take_complete_utf8(&mut pending), "a");
        assert_eq!(pending, vec![0xC3]);

        pending.push(0xA9);
        assert_eq!(take_complete_utf8(&mut pending), "é");
        assert!(pending.is_empty());

        let mut invalid = vec![0xFF, b'b'];
        assert_eq!(take_complete_utf8(&mut invalid), "\u{FFFD}b");
        assert!(invalid.is_empty());
    }

    #[test]
    fn test_shutdown_drains_and_stops() {
        let (mut bridge, collected) = collecting_bridge();
        let mut writer = bridge.writer().clone();
        for i in 0..100 {
            writer.write_all(format!("line {i}\n").as_bytes()).unwrap();
        }
        bridge.shutdown();

        assert_eq!(collected.lock().unwrap().len(), 100);
        assert!(!bridge.is_running());
        assert!(writer.is_closed());
        let err = writer.write(b"late\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_reader_ends_when_stream_closes() {
        let (writer, mut reader) = byte_stream();
        writer.clone().write_all(b"abc").unwrap();
        writer.close();

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }
}
