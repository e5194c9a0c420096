//! Per-chunk audio encoding.

use std::io::Cursor;

use anyhow::Context;
use bytes::Bytes;

/// Wire format of a synthesized stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudioFormat {
    /// Raw signed 16-bit little-endian mono samples. Chunks concatenate into
    /// one continuous signal.
    Pcm,
    /// A single WAV header with unknown length, then the same PCM frames as
    /// [`AudioFormat::Pcm`].
    #[default]
    Wav,
}

impl AudioFormat {
    pub fn content_type(&self, sample_rate: u32) -> String {
        match self {
            AudioFormat::Pcm => format!("audio/L16; rate={sample_rate}; channels=1"),
            AudioFormat::Wav => "audio/wav".to_string(),
        }
    }

    /// Bytes written once before the first chunk.
    pub fn stream_header(&self, sample_rate: u32) -> anyhow::Result<Option<Bytes>> {
        match self {
            AudioFormat::Pcm => Ok(None),
            AudioFormat::Wav => wav_stream_header(sample_rate).map(Some),
        }
    }

    /// Encode one chunk. Every format carries the chunk as bare PCM so that
    /// consecutive chunks join into one signal.
    pub fn encode(&self, samples: &[f32]) -> Bytes {
        encode_pcm16(samples)
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pcm" | "l16" => Ok(AudioFormat::Pcm),
            "wav" => Ok(AudioFormat::Wav),
            other => Err(anyhow::anyhow!("unknown audio format '{other}' (expected pcm or wav)")),
        }
    }
}

// f32 [-1.0, 1.0] -> i16
fn to_i16(s: f32) -> i16 {
    const I16_MAX_F32: f32 = i16::MAX as f32;
    (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16
}

/// Encode samples as headerless 16-bit PCM.
pub fn encode_pcm16(samples: &[f32]) -> Bytes {
    let mut out = Vec::<u8>::with_capacity(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&to_i16(s).to_le_bytes());
    }
    Bytes::from(out)
}

// Sizes for a stream whose length is not known up front. The data size stays
// a whole number of 16-bit frames.
const UNKNOWN_RIFF_LENGTH: u32 = u32::MAX;
const UNKNOWN_DATA_LENGTH: u32 = u32::MAX - 1;

/// Header for a 16-bit mono WAV stream of unknown length.
///
/// hound writes the header for an empty file; both size fields are then set
/// to their maximum so readers keep decoding until the stream ends.
pub fn wav_stream_header(sample_rate: u32) -> anyhow::Result<Bytes> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44));
    hound::WavWriter::new(&mut cursor, spec)
        .context("wav header")?
        .finalize()
        .context("wav finalize")?;
    let mut header = cursor.into_inner();

    let data_at = header
        .windows(4)
        .rposition(|w| w == b"data")
        .ok_or_else(|| anyhow::anyhow!("wav header has no data chunk"))?;
    header[4..8].copy_from_slice(&UNKNOWN_RIFF_LENGTH.to_le_bytes());
    header[data_at + 4..data_at + 8].copy_from_slice(&UNKNOWN_DATA_LENGTH.to_le_bytes());

    Ok(Bytes::from(header))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_pcm16_clamps_and_is_little_endian() {
        let out = encode_pcm16(&[0.0, 1.0, -2.0]);
        assert_eq!(out.len(), 6);
        assert_eq!(&out[0..2], &[0, 0]);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([out[4], out[5]]), -i16::MAX);
    }

    #[test]
    fn test_wav_stream_decodes_across_chunks() {
        let chunks: [&[f32]; 3] = [&[0.0, 0.5], &[-0.5], &[0.25, -0.25, 1.0]];
        let format = AudioFormat::Wav;

        let mut body = format.stream_header(22_050).unwrap().unwrap().to_vec();
        assert_eq!(&body[0..4], b"RIFF");
        for chunk in chunks {
            body.extend_from_slice(&format.encode(chunk));
        }

        let mut reader = hound::WavReader::new(Cursor::new(body)).unwrap();
        assert_eq!(reader.spec().sample_rate, 22_050);
        assert_eq!(reader.spec().channels, 1);
        // The unknown length runs past the end of the body; stop at EOF.
        let decoded: Vec<i16> = reader.samples::<i16>().map_while(Result::ok).collect();
        let expected: Vec<i16> = chunks.iter().flat_map(|c| c.iter().map(|&s| to_i16(s))).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_pcm_stream_has_no_header() {
        assert!(AudioFormat::Pcm.stream_header(16_000).unwrap().is_none());
        assert_eq!(AudioFormat::Pcm.encode(&[0.5]), AudioFormat::Wav.encode(&[0.5]));
    }

    #[test]
    fn test_audio_format_parsing_and_content_type() {
        assert_eq!("PCM".parse::<AudioFormat>().unwrap(), AudioFormat::Pcm);
        assert_eq!("wav".parse::<AudioFormat>().unwrap(), AudioFormat::Wav);
        assert!("mp3".parse::<AudioFormat>().is_err());
        assert_eq!(
            AudioFormat::Pcm.content_type(16_000),
            "audio/L16; rate=16000; channels=1"
        );
        assert_eq!(AudioFormat::Wav.content_type(16_000), "audio/wav");
    }
}
