/// Fixed-size buffer that hands out full batches.
///
/// `push` returns the buffered items once exactly `batch_size` of them have
/// accumulated. Whatever remains at the end is either flushed with `finish`
/// or thrown away with `discard`.
#[derive(Debug)]
pub struct Batcher<T> {
    buffer: Vec<T>,
    batch_size: usize,
}

impl<T> Batcher<T> {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            buffer: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.buffer.push(item);
        if self.buffer.len() >= self.batch_size {
            Some(std::mem::replace(
                &mut self.buffer,
                Vec::with_capacity(self.batch_size),
            ))
        } else {
            None
        }
    }

    /// The final partial batch, if any.
    pub fn finish(&mut self) -> Option<Vec<T>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Drop the buffered items and return how many there were.
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }
}
