//! The carrier object for one MAIL...DATA envelope and its body.

use std::{
    fs,
    io::{self, Read, Seek, Write},
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use smtp_types::{core::EhloKeywords, envelope::EnvelopeRoute};

/// One mail transaction.
///
/// Created when MAIL is accepted; dropped on RSET, QUIT, session abort, or
/// after the end-of-data reply. The session identity fields are snapshots
/// taken at MAIL time, so a transaction handed to a handler stays meaningful
/// even if the session has moved on.
#[derive(Debug)]
pub struct Transaction {
    pub server_helo: Option<String>,
    pub server_ehlo_keywords: EhloKeywords,
    pub server_domain: Option<String>,
    pub server_address: Option<String>,
    pub client_helo: Option<String>,
    pub client_domain: Option<String>,
    pub client_address: Option<String>,

    pub reverse_path: EnvelopeRoute,
    /// Accepted forward paths, in RCPT order.
    pub forward_paths: Vec<EnvelopeRoute>,

    pub body: BodySink,
}

impl Transaction {
    pub fn new(reverse_path: EnvelopeRoute, body: BodySink) -> Self {
        Self {
            server_helo: None,
            server_ehlo_keywords: EhloKeywords::new(),
            server_domain: None,
            server_address: None,
            client_helo: None,
            client_domain: None,
            client_address: None,
            reverse_path,
            forward_paths: Vec::new(),
            body,
        }
    }
}

static SPILL_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
enum SinkInner {
    Memory(Vec<u8>),
    File { file: fs::File, path: PathBuf },
}

/// An append-only body sink.
///
/// Buffers in memory until the configured threshold, then spills to a
/// temporary file which is removed when the sink is dropped.
#[derive(Debug)]
pub struct BodySink {
    threshold: usize,
    len: u64,
    inner: SinkInner,
}

impl Default for BodySink {
    fn default() -> Self {
        Self::with_threshold(256 * 1024)
    }
}

impl BodySink {
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            threshold,
            len: 0,
            inner: SinkInner::Memory(Vec::new()),
        }
    }

    /// Bytes appended so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The body bytes, if they are still held in memory.
    pub fn as_memory(&self) -> Option<&[u8]> {
        match &self.inner {
            SinkInner::Memory(bytes) => Some(bytes),
            SinkInner::File { .. } => None,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        if let SinkInner::Memory(held) = &mut self.inner {
            if held.len() + bytes.len() > self.threshold {
                let path = spill_path();
                let mut file = fs::OpenOptions::new()
                    .create_new(true)
                    .read(true)
                    .write(true)
                    .open(&path)?;
                file.write_all(held)?;
                self.inner = SinkInner::File { file, path };
            }
        }

        match &mut self.inner {
            SinkInner::Memory(held) => held.extend_from_slice(bytes),
            SinkInner::File { file, .. } => file.write_all(bytes)?,
        }

        self.len += bytes.len() as u64;
        Ok(())
    }

    /// Read the whole body back, wherever it currently lives.
    pub fn to_vec(&mut self) -> io::Result<Vec<u8>> {
        match &mut self.inner {
            SinkInner::Memory(held) => Ok(held.clone()),
            SinkInner::File { file, .. } => {
                let mut bytes = Vec::with_capacity(self.len as usize);
                file.seek(io::SeekFrom::Start(0))?;
                file.read_to_end(&mut bytes)?;
                file.seek(io::SeekFrom::End(0))?;
                Ok(bytes)
            }
        }
    }
}

impl Drop for BodySink {
    fn drop(&mut self) {
        if let SinkInner::File { path, .. } = &self.inner {
            let _ = fs::remove_file(path);
        }
    }
}

fn spill_path() -> PathBuf {
    let seq = SPILL_SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "smtp-toolkit-body-{}-{}",
        std::process::id(),
        seq
    ))
}
