//! Audio file loading
//!
//! WAV files are read with `hound`; MP3, FLAC and OGG go through Symphonia.
//! Every clip is downmixed to mono; resampling is a separate step (see
//! [`crate::resampler`]).

use std::path::Path;

use hound::{SampleFormat, WavReader};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use crate::error::{AudioError, Result};

/// A decoded mono clip at its native sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Native sample rate of the source file
    pub sample_rate: u32,
    /// Channel count of the source file before downmixing
    pub source_channels: u16,
}

impl AudioClip {
    /// Clip duration in seconds
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Load an audio file (WAV, MP3, FLAC, OGG) as mono `f32` samples.
///
/// A missing file is reported as [`AudioError::NotFound`]; anything that
/// exists but cannot be decoded is [`AudioError::Decode`].
pub fn load<P: AsRef<Path>>(path: P) -> Result<AudioClip> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(AudioError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match extension.as_deref() {
        Some("wav") | Some("wave") => load_wav(path),
        Some("mp3") | Some("flac") | Some("ogg") | None => load_with_symphonia(path),
        Some(other) => Err(AudioError::UnsupportedFormat(other.to_string())),
    }
}

/// Load WAV file
fn load_wav(path: &Path) -> Result<AudioClip> {
    let mut reader = WavReader::open(path)
        .map_err(|e| AudioError::decode(format!("Failed to open WAV: {}", e)))?;

    let spec = reader.spec();
    info!(
        "Loaded WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    if spec.channels == 0 {
        return Err(AudioError::decode("WAV header declares zero channels"));
    }

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AudioError::decode(format!("Failed to read samples: {}", e)))?,
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = (1_i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| AudioError::decode(format!("Failed to read samples: {}", e)))?
        }
        (format, bits) => {
            return Err(AudioError::decode(format!(
                "Unsupported WAV sample format: {:?} {} bits",
                format, bits
            )))
        }
    };

    Ok(AudioClip {
        samples: downmix(samples, spec.channels as usize),
        sample_rate: spec.sample_rate,
        source_channels: spec.channels,
    })
}

/// Load audio file using Symphonia (MP3, FLAC, etc.)
fn load_with_symphonia(path: &Path) -> Result<AudioClip> {
    let file = std::fs::File::open(path)?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::decode(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::decode("No audio tracks found"))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioError::decode("Could not determine sample rate"))?;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::decode(format!("Failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(AudioError::decode(format!("Failed to read packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| AudioError::decode(format!("Failed to decode: {}", e)))?;

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    info!(
        "Loaded audio via Symphonia: {} Hz, {} channels",
        sample_rate, channels
    );

    Ok(AudioClip {
        samples: downmix(samples, channels.max(1)),
        sample_rate,
        source_channels: channels.max(1) as u16,
    })
}

/// Average interleaved frames down to one channel
pub fn downmix(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }

    debug!("Downmixing {} channels to mono", channels);
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_wav(path: &Path, channels: u16, rate: u32, frames: &[i16]) {
        let spec = WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in frames {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = load("/definitely/not/here.wav").unwrap_err();
        assert!(matches!(err, AudioError::NotFound(_)));
    }

    #[test]
    fn test_load_mono_wav() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mono.wav");
        write_wav(&path, 1, 16000, &[0, 16384, -16384, 32767]);

        let clip = load(&path).unwrap();
        assert_eq!(clip.sample_rate, 16000);
        assert_eq!(clip.source_channels, 1);
        assert_eq!(clip.samples.len(), 4);
        approx::assert_abs_diff_eq!(clip.samples[1], 0.5, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(clip.samples[2], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_load_stereo_wav_downmixes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stereo.wav");
        write_wav(&path, 2, 8000, &[16384, 0, -16384, -16384]);

        let clip = load(&path).unwrap();
        assert_eq!(clip.source_channels, 2);
        assert_eq!(clip.samples.len(), 2);
        approx::assert_abs_diff_eq!(clip.samples[0], 0.25, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(clip.samples[1], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_wav_loads() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.wav");
        write_wav(&path, 1, 16000, &[]);

        let clip = load(&path).unwrap();
        assert!(clip.samples.is_empty());
        assert_eq!(clip.duration_secs(), 0.0);
    }

    #[test]
    fn test_garbage_wav_is_decode_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("garbage.wav");
        std::fs::write(&path, b"definitely not RIFF data").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));
    }

    #[test]
    fn test_unknown_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clip.xyz");
        std::fs::write(&path, b"data").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat(_)));
    }
}
