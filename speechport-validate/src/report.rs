//! Validation outcome

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Whether the decoded output looks like a working model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    /// The run completed but the output is implausible
    Suspicious(String),
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub artifact: PathBuf,
    pub audio: PathBuf,
    /// One transcript per batch element
    pub transcripts: Vec<String>,
    /// Frame-level arg-max ids per batch element
    pub predicted_ids: Vec<Vec<usize>>,
    /// Samples fed to the engine, after padding
    pub input_samples: usize,
    /// Samples taken from the audio file, after resampling
    pub audio_samples: usize,
    /// `(batch, frames, vocab)` shape returned by the engine
    pub output_shape: [usize; 3],
    pub inference_time: Duration,
    pub verdict: Verdict,
}

impl ValidationReport {
    /// Transcript of the first batch element
    pub fn transcript(&self) -> &str {
        self.transcripts.first().map(String::as_str).unwrap_or("")
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

/// Judge decoded output
pub fn verdict(transcripts: &[String], non_finite_logits: usize) -> Verdict {
    if non_finite_logits > 0 {
        return Verdict::Suspicious(format!("{} non-finite logits", non_finite_logits));
    }
    if transcripts.is_empty() || transcripts.iter().all(|t| t.trim().is_empty()) {
        return Verdict::Suspicious("empty transcript".to_string());
    }
    Verdict::Passed
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Artifact:    {}", self.artifact.display())?;
        writeln!(f, "Audio:       {}", self.audio.display())?;
        writeln!(
            f,
            "Input:       {} samples ({} from audio)",
            self.input_samples, self.audio_samples
        )?;
        writeln!(f, "Output:      {:?}", self.output_shape)?;
        writeln!(f, "Inference:   {:.1} ms", self.inference_time.as_secs_f64() * 1000.0)?;
        writeln!(f, "Transcript:  {}", self.transcript())?;
        match &self.verdict {
            Verdict::Passed => write!(f, "Result:      passed"),
            Verdict::Suspicious(reason) => write!(f, "Result:      suspicious ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdicts() {
        assert_eq!(verdict(&["안녕".to_string()], 0), Verdict::Passed);
        assert!(matches!(verdict(&["".to_string()], 0), Verdict::Suspicious(_)));
        assert!(matches!(verdict(&[], 0), Verdict::Suspicious(_)));
        assert!(matches!(verdict(&["a".to_string()], 3), Verdict::Suspicious(_)));
    }

    #[test]
    fn test_display_mentions_transcript() {
        let report = ValidationReport {
            artifact: PathBuf::from("out/onnx/model.onnx"),
            audio: PathBuf::from("clip.wav"),
            transcripts: vec!["hello".to_string()],
            predicted_ids: vec![vec![1, 2]],
            input_samples: 16000,
            audio_samples: 16000,
            output_shape: [1, 2, 8],
            inference_time: Duration::from_millis(12),
            verdict: Verdict::Passed,
        };
        let text = report.to_string();
        assert!(text.contains("Transcript:  hello"));
        assert!(text.ends_with("passed"));
    }
}
