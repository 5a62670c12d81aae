/// Little-endian reader over a raw log buffer
///
/// Besides sequential reads for the header, the heuristic scanner reads
/// arbitrary offsets without moving the cursor via the `peek_*_at` methods.
pub struct LogDataStream<'a> {
    data: &'a [u8],
    pub pos: usize,
    pub eof: bool,
}

impl<'a> LogDataStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            eof: data.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
        self.eof = pos >= self.data.len();
    }

    /// Bytes `[offset, offset + len)` if the buffer is long enough
    fn peek_slice_at(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        let end = offset.checked_add(len)?;
        self.data.get(offset..end)
    }

    fn peek_array_at<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        self.peek_slice_at(offset, N)?.try_into().ok()
    }

    pub fn peek_f64_at(&self, offset: usize) -> Option<f64> {
        self.peek_array_at::<8>(offset).map(f64::from_le_bytes)
    }

    pub fn peek_f32_at(&self, offset: usize) -> Option<f32> {
        self.peek_array_at::<4>(offset).map(f32::from_le_bytes)
    }

    pub fn peek_i32_at(&self, offset: usize) -> Option<i32> {
        self.peek_array_at::<4>(offset).map(i32::from_le_bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        match self.peek_array_at::<N>(self.pos) {
            Some(bytes) => {
                self.set_position(self.pos + N);
                Some(bytes)
            }
            None => {
                self.eof = true;
                None
            }
        }
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_array::<1>().map(|b| b[0])
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        self.read_array::<2>().map(u16::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> Option<u64> {
        self.read_array::<8>().map(u64::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let mut data = Vec::new();
        data.extend_from_slice(&1234u64.to_le_bytes());
        data.extend_from_slice(&56u16.to_le_bytes());
        data.push(14);

        let mut stream = LogDataStream::new(&data);
        assert_eq!(stream.read_u64(), Some(1234));
        assert_eq!(stream.read_u16(), Some(56));
        assert_eq!(stream.read_u8(), Some(14));
        assert!(stream.eof);
        assert_eq!(stream.read_u8(), None);
    }

    #[test]
    fn test_peek_does_not_move_cursor() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&37.5f64.to_le_bytes());
        data.extend_from_slice(&(-1_220_000_000i32).to_le_bytes());
        data.extend_from_slice(&12.5f32.to_le_bytes());

        let stream = LogDataStream::new(&data);
        assert_eq!(stream.peek_f64_at(4), Some(37.5));
        assert_eq!(stream.peek_i32_at(12), Some(-1_220_000_000));
        assert_eq!(stream.peek_f32_at(16), Some(12.5));
        assert_eq!(stream.pos, 0);
    }

    #[test]
    fn test_peek_past_end() {
        let data = [0u8; 10];
        let stream = LogDataStream::new(&data);
        assert_eq!(stream.peek_f64_at(3), None);
        assert_eq!(stream.peek_i32_at(usize::MAX), None);
    }
}
