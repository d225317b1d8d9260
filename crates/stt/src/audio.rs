//! Audio loading and conversion
//!
//! Decodes audio files to the 16kHz mono f32 PCM whisper expects. Formats
//! symphonia cannot read are converted through FFmpeg first.

use quicktrans_common::{QuickTransError, Result};
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// Sample rate required by whisper
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Supported audio file extensions
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "flac", "m4a", "mp3", "mp4", "mpeg", "mpga", "oga", "ogg", "wav", "webm",
];

/// Check if file extension is supported
pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Check an audio path before any model work: non-empty, a supported
/// extension, and an existing file
pub fn check_audio_path(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(QuickTransError::validation("audio_path must not be empty"));
    }
    if !is_supported_audio(path) {
        return Err(QuickTransError::validation(format!(
            "Unsupported audio format: {} (expected one of: {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }
    if !path.is_file() {
        return Err(QuickTransError::not_found(format!(
            "Audio file not found: {}",
            path.display()
        )));
    }
    Ok(path.to_path_buf())
}

/// Audio buffer (f32 samples, interleaved when multi-channel)
pub struct AudioBuffer {
    /// Audio samples normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels
    pub channels: u16,
}

impl AudioBuffer {
    /// Create a new audio buffer
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Get duration in seconds
    pub fn duration(&self) -> f32 {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        frames as f32 / self.sample_rate as f32
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(mut self) -> Self {
        if self.channels <= 1 {
            return self;
        }

        debug!("Converting {} channel audio to mono", self.channels);

        let channels = self.channels as usize;
        self.samples = self
            .samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        self.channels = 1;
        self
    }

    /// Resample to target sample rate (linear interpolation, mono only)
    pub fn resample(mut self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate || self.samples.is_empty() {
            self.sample_rate = target_rate;
            return self;
        }

        debug!("Resampling from {}Hz to {}Hz", self.sample_rate, target_rate);

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let new_length = (self.samples.len() as f64 / ratio) as usize;
        let last = self.samples.len() - 1;
        let mut resampled = Vec::with_capacity(new_length);

        for i in 0..new_length {
            let src_index = i as f64 * ratio;
            let floor = (src_index.floor() as usize).min(last);
            let ceil = (floor + 1).min(last);
            let fraction = (src_index - floor as f64) as f32;

            resampled.push(self.samples[floor] * (1.0 - fraction) + self.samples[ceil] * fraction);
        }

        self.samples = resampled;
        self.sample_rate = target_rate;
        self
    }

    /// Mono, 16kHz
    pub fn into_whisper_input(self) -> Self {
        self.to_mono().resample(WHISPER_SAMPLE_RATE)
    }
}

/// Load an audio file as 16kHz mono PCM.
///
/// Tries symphonia first; on failure falls back to FFmpeg conversion.
pub fn load_audio(path: &Path) -> Result<AudioBuffer> {
    info!("Loading audio file: {}", path.display());

    match decode_with_symphonia(path) {
        Ok(buffer) => Ok(buffer.into_whisper_input()),
        Err(e) => {
            warn!("Native decode failed ({}), converting with FFmpeg", e);
            convert_and_load(path)
        }
    }
}

fn decode_with_symphonia(path: &Path) -> Result<AudioBuffer> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| QuickTransError::processing(format!("Unrecognized audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| QuickTransError::processing("No audio track found"))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| QuickTransError::processing("Unknown sample rate"))?;
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| QuickTransError::processing(format!("Unsupported codec: {}", e)))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                return Err(QuickTransError::processing(format!("Failed to read packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping corrupt audio frame: {}", e);
                continue;
            }
            Err(e) => {
                return Err(QuickTransError::processing(format!("Failed to decode audio: {}", e)));
            }
        };

        if decoded.frames() == 0 {
            continue;
        }

        let mut buffer = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() {
        return Err(QuickTransError::processing("No audio samples decoded"));
    }

    debug!(
        "Decoded {} samples at {}Hz, {} channels",
        samples.len(),
        sample_rate,
        channels
    );

    Ok(AudioBuffer::new(samples, sample_rate, channels as u16))
}

/// Convert audio file to 16kHz mono WAV using FFmpeg and load it
fn convert_and_load(path: &Path) -> Result<AudioBuffer> {
    let temp_wav = path.with_extension("quicktrans.wav");

    convert_to_wav_ffmpeg(path, &temp_wav)?;
    let result = decode_with_symphonia(&temp_wav).map(AudioBuffer::into_whisper_input);

    if let Err(e) = std::fs::remove_file(&temp_wav) {
        warn!("Failed to remove temporary WAV file: {}", e);
    }

    result
}

/// Convert audio file to WAV using FFmpeg
pub fn convert_to_wav_ffmpeg(input_path: &Path, output_path: &Path) -> Result<()> {
    use std::process::Command;

    info!("Converting {} to WAV using FFmpeg", input_path.display());

    let ffmpeg_cmd = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());

    let output = Command::new(&ffmpeg_cmd)
        .arg("-i")
        .arg(input_path)
        .args(["-ar", "16000", "-ac", "1", "-c:a", "pcm_s16le", "-y"])
        .arg(output_path)
        .output()
        .map_err(|e| {
            QuickTransError::processing(format!(
                "Failed to run FFmpeg: {}. Make sure FFmpeg is installed.",
                e
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let _ = std::fs::remove_file(output_path);
        return Err(QuickTransError::processing(format!(
            "FFmpeg conversion failed: {}",
            stderr
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let data_len = (samples.len() * 2) as u32;
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(b"RIFF").unwrap();
        file.write_all(&(36 + data_len).to_le_bytes()).unwrap();
        file.write_all(b"WAVEfmt ").unwrap();
        file.write_all(&16u32.to_le_bytes()).unwrap();
        file.write_all(&1u16.to_le_bytes()).unwrap();
        file.write_all(&channels.to_le_bytes()).unwrap();
        file.write_all(&sample_rate.to_le_bytes()).unwrap();
        file.write_all(&(sample_rate * channels as u32 * 2).to_le_bytes()).unwrap();
        file.write_all(&(channels * 2).to_le_bytes()).unwrap();
        file.write_all(&16u16.to_le_bytes()).unwrap();
        file.write_all(b"data").unwrap();
        file.write_all(&data_len.to_le_bytes()).unwrap();
        for s in samples {
            file.write_all(&s.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn test_is_supported_audio() {
        assert!(is_supported_audio(Path::new("test.wav")));
        assert!(is_supported_audio(Path::new("test.MP3")));
        assert!(is_supported_audio(Path::new("test.m4a")));
        assert!(!is_supported_audio(Path::new("test.txt")));
    }

    #[test]
    fn test_check_audio_path() {
        let err = check_audio_path(Path::new("")).unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let notes = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        let err = check_audio_path(notes.path()).unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let err = check_audio_path(Path::new("/no/such/clip.mp3")).unwrap_err();
        assert!(matches!(err, QuickTransError::NotFound(_)));

        let clip = tempfile::Builder::new().suffix(".ogg").tempfile().unwrap();
        assert_eq!(check_audio_path(clip.path()).unwrap(), clip.path());
    }

    #[test]
    fn test_audio_buffer_duration() {
        let buffer = AudioBuffer::new(vec![0.0; 16000], 16000, 1);
        assert_eq!(buffer.duration(), 1.0);

        let buffer = AudioBuffer::new(vec![0.0; 16000], 16000, 2);
        assert_eq!(buffer.duration(), 0.5);
    }

    #[test]
    fn test_to_mono() {
        let buffer = AudioBuffer::new(vec![0.5, -0.5, 0.5, -0.5], 16000, 2);
        let mono = buffer.to_mono();
        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples, vec![0.0, 0.0]);
    }

    #[test]
    fn test_resample() {
        let buffer = AudioBuffer::new(vec![0.0; 44100], 44100, 1);
        let resampled = buffer.resample(16000);
        assert_eq!(resampled.sample_rate, 16000);
        assert!((resampled.samples.len() as i32 - 16000).abs() < 100);
    }

    #[test]
    fn test_load_wav_stereo_8k() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        // 1 second of stereo silence at 8kHz
        write_wav(&path, 8000, 2, &vec![0i16; 16000]);

        let buffer = load_audio(&path).unwrap();
        assert_eq!(buffer.sample_rate, WHISPER_SAMPLE_RATE);
        assert_eq!(buffer.channels, 1);
        assert!((buffer.duration() - 1.0).abs() < 0.01);
    }
}
