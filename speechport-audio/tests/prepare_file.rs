//! End-to-end preprocessing: WAV on disk -> normalized model input

use hound::{SampleFormat, WavSpec, WavWriter};
use speechport_audio::{AudioError, FeatureExtractorConfig};

fn write_tone(path: &std::path::Path, rate: u32, channels: u16, seconds: f32) {
    let spec = WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    let frames = (rate as f32 * seconds) as usize;
    for i in 0..frames {
        let v = (i as f32 * 330.0 * 2.0 * std::f32::consts::PI / rate as f32).sin() * 0.4;
        for _ in 0..channels {
            writer.write_sample((v * 32767.0) as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
}

#[test]
fn test_prepare_resamples_stereo_44k() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("tone.wav");
    write_tone(&path, 44100, 2, 0.5);

    let config = FeatureExtractorConfig::default();
    let prepared = config.prepare_file(&path, 400).unwrap();

    assert_eq!(prepared.source_rate, 44100);
    assert_eq!(prepared.samples, 8000);
    assert_eq!(prepared.input.shape(), &[1, 8000]);

    let mean = prepared.input.mean().unwrap();
    approx::assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-3);
}

#[test]
fn test_prepare_pads_short_clip() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("blip.wav");
    write_tone(&path, 16000, 1, 0.01);

    let config = FeatureExtractorConfig::default();
    let prepared = config.prepare_file(&path, 400).unwrap();

    assert_eq!(prepared.samples, 160);
    assert_eq!(prepared.input.shape(), &[1, 400]);
}

#[test]
fn test_prepare_missing_file() {
    let config = FeatureExtractorConfig::default();
    let err = config.prepare_file("/no/such/clip.wav", 1).unwrap_err();
    assert!(matches!(err, AudioError::NotFound(_)));
}
