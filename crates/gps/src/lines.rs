pub const BUFFER_LEN: usize = 512;

/// Accumulates raw serial bytes and hands out complete `\n` terminated lines.
pub struct LineBuffer {
    buf: [u8; BUFFER_LEN],
    len: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: [0u8; BUFFER_LEN],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Free tail of the buffer for the next read.
    pub fn unfilled(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    pub fn advance(&mut self, n: usize) {
        self.len = (self.len + n).min(BUFFER_LEN);
    }

    /// Copies as much of `bytes` as fits, returning the number copied.
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(BUFFER_LEN - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        n
    }

    /// Calls `f` for every complete line (newline included), then shifts the
    /// unconsumed tail to the front. A full buffer with no newline in it is
    /// dropped so the reader can resynchronise; returns true when that happens.
    pub fn drain_lines(&mut self, mut f: impl FnMut(&[u8])) -> bool {
        let mut start = 0;
        while let Some(pos) = self.buf[start..self.len].iter().position(|&b| b == b'\n') {
            let end = start + pos + 1;
            f(&self.buf[start..end]);
            start = end;
        }

        if start > 0 {
            self.buf.copy_within(start..self.len, 0);
            self.len -= start;
        }

        if self.len == BUFFER_LEN {
            self.len = 0;
            return true;
        }
        false
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
