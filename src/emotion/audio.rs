//! Decoding of uploaded audio (any container symphonia knows) to mono f32.

use super::EmotionError;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

#[derive(Debug)]
pub struct DecodedAudio {
    /// Mono samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

fn extension_hint(bytes: &[u8], file_name: Option<&str>) -> Option<String> {
    file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .or_else(|| infer::get(bytes).map(|kind| kind.extension().to_string()))
}

/// Decodes the first audio track, averaging channels to mono. Decoding
/// stops once `max_seconds` of audio are available.
pub fn decode_audio(
    bytes: Vec<u8>,
    file_name: Option<&str>,
    max_seconds: Option<f64>,
) -> Result<DecodedAudio, EmotionError> {
    let mut hint = Hint::new();
    if let Some(extension) = extension_hint(&bytes, file_name) {
        hint.with_extension(&extension);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| EmotionError::Decode(format!("unrecognized audio format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| EmotionError::Decode("no audio track".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| EmotionError::Decode("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| EmotionError::Decode(format!("unsupported codec: {}", e)))?;

    let max_samples = max_seconds.map(|secs| (secs * sample_rate as f64).ceil() as usize);
    let mut samples = Vec::new();
    let mut buffer: Option<SampleBuffer<f32>> = None;
    loop {
        if max_samples.is_some_and(|max| samples.len() >= max) {
            debug!("Audio longer than {:?}s, ignoring the rest", max_seconds);
            break;
        }
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(EmotionError::Decode(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping corrupt audio packet: {}", e);
                continue;
            }
            Err(e) => return Err(EmotionError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let needs_new_buffer = buffer
            .as_ref()
            .map(|b| b.capacity() < decoded.capacity() * channels)
            .unwrap_or(true);
        if needs_new_buffer {
            buffer = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = buffer.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend(
                buf.samples()
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }
    }

    if samples.is_empty() {
        return Err(EmotionError::Decode("no audio samples".to_string()));
    }
    if let Some(max) = max_samples {
        samples.truncate(max);
    }
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}
