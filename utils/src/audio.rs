use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree};

/// Resampler between a device rate and the wire rate, mono, fixed input
/// chunk size.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Split samples into fixed-size chunks, zero-padding the tail so every
/// chunk satisfies the resampler's fixed input size.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Ring buffer shared between the decode task and the output stream
/// callback. Sized in samples.
pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_are_padded() {
        let samples = vec![1.0f32; 5];
        let chunks = split_for_chunks(&samples, 4);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], vec![1.0; 4]);
        assert_eq!(chunks[1], vec![1.0, 0.0, 0.0, 0.0]);
    }
}
