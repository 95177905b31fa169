//! WAV container helpers

use crate::{Error, Result};

/// Container formats recognized by their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Wav,
    Mp3,
    Ogg,
}

impl Container {
    /// Sniff the container from the first bytes of a payload
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            Some(Self::Wav)
        } else if bytes.starts_with(b"ID3")
            || (bytes.len() >= 2 && bytes[0] == 0xFF && matches!(bytes[1], 0xFB | 0xFA | 0xF3 | 0xF2))
        {
            // ID3 tag or a bare MPEG layer III frame sync
            Some(Self::Mp3)
        } else if bytes.starts_with(b"OggS") {
            Some(Self::Ogg)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Ogg => "audio/ogg",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
        }
    }
}

/// Return `bytes` in a playable container.
///
/// Payloads already in a known container pass through untouched. Anything
/// else is taken as raw 16-bit little-endian mono PCM and wrapped in a WAV
/// header at `sample_rate`.
///
/// # Errors
///
/// Returns error if the payload is empty or WAV encoding fails
pub fn ensure_container(bytes: &[u8], sample_rate: u32) -> Result<(Vec<u8>, Container)> {
    if bytes.is_empty() {
        return Err(Error::Audio("empty audio payload".to_string()));
    }

    if let Some(container) = Container::detect(bytes) {
        return Ok((bytes.to_vec(), container));
    }

    let chunks = bytes.chunks_exact(2);
    if !chunks.remainder().is_empty() {
        tracing::debug!(len = bytes.len(), "odd-length PCM payload, dropping trailing byte");
    }
    let samples: Vec<i16> = chunks
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok((pcm_to_wav(&samples, sample_rate)?, Container::Wav))
}

/// Encode signed 16-bit mono samples as a WAV file
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// A WAV file of silence lasting `millis` milliseconds
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn silence_wav(millis: u32, sample_rate: u32) -> Result<Vec<u8>> {
    let count = u64::from(sample_rate) * u64::from(millis) / 1000;
    let count = usize::try_from(count).map_err(|e| Error::Audio(e.to_string()))?;
    pcm_to_wav(&vec![0; count], sample_rate)
}

/// Duration of a WAV payload in milliseconds, if it parses
#[must_use]
pub fn wav_duration_ms(bytes: &[u8]) -> Option<u64> {
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(u64::from(reader.duration()) * 1000 / u64::from(spec.sample_rate))
}
