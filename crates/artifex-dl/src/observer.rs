use std::io::{self, Write};

use artifex_utils::hash::Checksummer;

/// Something that wants to see every byte of a transfer as it lands on disk.
pub trait ChunkObserver {
    fn observe(&mut self, chunk: &[u8]);
}

impl ChunkObserver for Checksummer {
    fn observe(&mut self, chunk: &[u8]) {
        self.update(chunk);
    }
}

/// A writer that forwards bytes to `inner` and shows each accepted chunk to its observers.
///
/// Observers only ever see the bytes `inner` reported as written, so a short write never
/// makes a checksum or progress count run ahead of the file.
pub struct ObservingWriter<'a, W: Write> {
    inner: W,
    observers: Vec<&'a mut dyn ChunkObserver>,
    written: u64,
}

impl<'a, W: Write> ObservingWriter<'a, W> {
    pub fn new(inner: W, observers: Vec<&'a mut dyn ChunkObserver>) -> Self {
        Self {
            inner,
            observers,
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ObservingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        let accepted = &buf[..n];
        for observer in self.observers.iter_mut() {
            observer.observe(accepted);
        }
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
