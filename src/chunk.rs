//! Payload chunking: split a message into fixed-size, ordered slices.

/// Split `data` into consecutive chunks of at most `size` bytes each.
/// The final chunk may be shorter. An empty `data` yields zero chunks.
pub fn split_data(data: &[u8], size: usize) -> Vec<Vec<u8>> {
    if data.is_empty() {
        return Vec::new();
    }
    data.chunks(size).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_yields_no_chunks() {
        assert_eq!(split_data(b"", 50), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn exact_multiple_of_chunk_size() {
        let data = vec![0u8; 50];
        assert_eq!(split_data(&data, 50).len(), 1);
    }

    #[test]
    fn one_byte_over_chunk_size_makes_two_chunks() {
        let data = vec![0u8; 51];
        let chunks = split_data(&data, 50);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 50);
        assert_eq!(chunks[1].len(), 1);
    }

    #[test]
    fn preserves_byte_order() {
        let data: Vec<u8> = (0..125u8).collect();
        let chunks = split_data(&data, 50);
        assert_eq!(chunks.len(), 3);
        let mut flattened = Vec::new();
        for chunk in &chunks {
            flattened.extend_from_slice(chunk);
        }
        assert_eq!(flattened, data);
    }
}
