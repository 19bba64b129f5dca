//! A double-buffered background writer: the foreground thread fills a
//! buffer and hands it off; a single dedicated writer thread drains it
//! to disk, so the foreground never blocks on I/O except at handoff and
//! at `close`.

use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum BufferState {
    Start,
    Ready,
    Writing,
    Exiting,
    Error(String),
}

struct Shared {
    state: Mutex<BufferState>,
    cond: Condvar,
    buf: Mutex<Vec<u8>>,
}

/// Buffers writes in memory up to `blk_size` bytes, then hands the
/// filled buffer to a background thread for writing while the
/// foreground continues filling the other buffer.
pub struct BlockWriter {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    current: Vec<u8>,
    blk_size: usize,
}

impl BlockWriter {
    pub fn new(file: File, blk_size: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(BufferState::Start),
            cond: Condvar::new(),
            buf: Mutex::new(Vec::new()),
        });
        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::spawn(move || writer_loop(worker_shared, file));
        Self {
            shared,
            handle: Some(handle),
            current: Vec::with_capacity(blk_size),
            blk_size,
        }
    }

    /// Appends `bytes`, flushing the current buffer to the background
    /// thread whenever it reaches `blk_size`.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_error()?;
        self.current.extend_from_slice(bytes);
        if self.current.len() >= self.blk_size {
            self.flush_current()?;
        }
        Ok(())
    }

    fn flush_current(&mut self) -> Result<()> {
        if self.current.is_empty() {
            return Ok(());
        }
        let mut state = self.shared.state.lock().unwrap();
        while *state == BufferState::Writing {
            state = self.shared.cond.wait(state).unwrap();
        }
        if let BufferState::Error(msg) = &*state {
            return Err(Error::Io(std::io::Error::other(msg.clone())));
        }
        *self.shared.buf.lock().unwrap() = std::mem::take(&mut self.current);
        *state = BufferState::Ready;
        self.shared.cond.notify_all();
        Ok(())
    }

    fn check_error(&self) -> Result<()> {
        if let BufferState::Error(msg) = &*self.shared.state.lock().unwrap() {
            return Err(Error::Io(std::io::Error::other(msg.clone())));
        }
        Ok(())
    }

    /// Flushes any remaining buffered bytes, signals the writer thread
    /// to exit, and joins it. Every buffer handed off before `close` is
    /// guaranteed to have been written before this returns.
    pub fn close(mut self) -> Result<()> {
        self.flush_current()?;
        {
            let mut state = self.shared.state.lock().unwrap();
            while *state == BufferState::Ready || *state == BufferState::Writing {
                state = self.shared.cond.wait(state).unwrap();
            }
            if let BufferState::Error(msg) = &*state {
                return Err(Error::Io(std::io::Error::other(msg.clone())));
            }
            *state = BufferState::Exiting;
            self.shared.cond.notify_all();
        }
        if let Some(h) = self.handle.take() {
            h.join().map_err(|_| Error::Io(std::io::Error::other("block writer thread panicked")))?;
        }
        self.check_error()
    }
}

fn writer_loop(shared: Arc<Shared>, mut file: File) {
    loop {
        let mut state = shared.state.lock().unwrap();
        loop {
            match &*state {
                BufferState::Ready => break,
                BufferState::Exiting => return,
                BufferState::Error(_) => return,
                _ => {}
            }
            state = shared.cond.wait(state).unwrap();
        }
        *state = BufferState::Writing;
        drop(state);

        let buf = std::mem::take(&mut *shared.buf.lock().unwrap());
        let result = file.write_all(&buf).and_then(|()| file.flush());

        let mut state = shared.state.lock().unwrap();
        match result {
            Ok(()) => {
                if *state != BufferState::Exiting {
                    *state = BufferState::Start;
                }
            }
            Err(e) => *state = BufferState::Error(e.to_string()),
        }
        shared.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_all_bytes_across_many_small_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let file = File::create(&path).unwrap();
        let mut writer = BlockWriter::new(file, 16);
        for _ in 0..100 {
            writer.write(&[1u8; 7]).unwrap();
        }
        writer.close().unwrap();
        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), 700);
        assert!(data.iter().all(|&b| b == 1));
    }
}
