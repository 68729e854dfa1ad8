//! Time-window batching of logged frames
//!
//! A live controller hands the fusion core every frame received since the last
//! tick. Replay reproduces that by cutting the log into fixed windows measured
//! from the first frame of each batch.

use radar_fusion::{CanFrame, Result};

/// Groups a frame stream into per-tick batches
pub struct Batches<I> {
    frames: I,
    period_ns: u64,
    carry: Option<CanFrame>,
}

impl<I> Batches<I>
where
    I: Iterator<Item = Result<CanFrame>>,
{
    pub fn new(frames: I, period_ms: u64) -> Self {
        Self {
            frames,
            period_ns: period_ms.saturating_mul(1_000_000),
            carry: None,
        }
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = Result<CanFrame>>,
{
    type Item = Result<Vec<CanFrame>>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = match self.carry.take() {
            Some(frame) => frame,
            None => match self.frames.next()? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e)),
            },
        };

        let window_end = first.timestamp_ns.saturating_add(self.period_ns);
        let mut batch = vec![first];

        for item in self.frames.by_ref() {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e)),
            };
            if frame.timestamp_ns >= window_end {
                self.carry = Some(frame);
                break;
            }
            batch.push(frame);
        }

        Some(Ok(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_fusion::FusionError;

    fn frame(ms: u64) -> Result<CanFrame> {
        Ok(CanFrame::new(ms * 1_000_000, 0, 0x420, vec![0; 8]))
    }

    #[test]
    fn test_batches_by_window() {
        let frames = vec![frame(0), frame(3), frame(9), frame(10), frame(25), frame(26)];
        let batches: Vec<Vec<CanFrame>> = Batches::new(frames.into_iter(), 10)
            .collect::<Result<_>>()
            .unwrap();

        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 1, 2]);
        assert_eq!(batches[2][0].timestamp_ns, 25_000_000);
    }

    #[test]
    fn test_empty_stream() {
        let mut batches = Batches::new(std::iter::empty::<Result<CanFrame>>(), 10);
        assert!(batches.next().is_none());
    }

    #[test]
    fn test_error_is_forwarded() {
        let frames = vec![
            frame(0),
            Err(FusionError::LogParseError("line 2: bad".to_string())),
        ];
        let mut batches = Batches::new(frames.into_iter(), 10);
        assert!(batches.next().unwrap().is_err());
    }
}
