//! Sample buffer returned by analog reads.

/// Samples from one `ReadAnalogF64` call, grouped by channel.
///
/// All samples of channel 0 come first, then channel 1, and so on. Each
/// channel occupies `len() / num_channels()` slots, of which the first
/// `samples_per_channel()` hold data actually read.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    data: Vec<f64>,
    num_channels: usize,
    samples_per_channel: usize,
}

impl SampleBuffer {
    /// Wrap a channel-major read array.
    ///
    /// `samples_per_channel_read` is the count reported by the server; a
    /// non-positive value means "the whole array".
    #[must_use]
    pub fn new(data: Vec<f64>, num_channels: u32, samples_per_channel_read: i32) -> Self {
        let num_channels = (num_channels as usize).max(1);
        let stride = data.len() / num_channels;
        let samples_per_channel = match usize::try_from(samples_per_channel_read) {
            Ok(read) if read > 0 => read.min(stride),
            _ => stride,
        };

        Self {
            data,
            num_channels,
            samples_per_channel,
        }
    }

    /// Total number of values in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the read returned no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// First value of the buffer (first sample of channel 0).
    #[must_use]
    pub fn first(&self) -> Option<f64> {
        self.data.first().copied()
    }

    /// Number of channels the buffer is grouped into.
    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Samples per channel actually read.
    #[must_use]
    pub fn samples_per_channel(&self) -> usize {
        self.samples_per_channel
    }

    /// Samples of one channel.
    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        if index >= self.num_channels {
            return None;
        }
        let start = index * (self.data.len() / self.num_channels);
        self.data.get(start..start + self.samples_per_channel)
    }

    /// Iterate over channels in order.
    pub fn channels(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.num_channels).filter_map(move |index| self.channel(index))
    }

    /// The raw channel-major array.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Consume the buffer, returning the raw channel-major array.
    #[must_use]
    pub fn into_inner(self) -> Vec<f64> {
        self.data
    }
}
