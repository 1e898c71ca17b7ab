//! MFCC feature extraction.
//!
//! Produces the same layout the speech classifier was trained on: a
//! centered STFT with a periodic Hann window, a Slaney-style mel
//! filterbank, power in dB clipped 80 dB below the peak, an orthonormal
//! DCT-II and finally the mean of every coefficient over time.

use super::EmotionError;
use realfft::RealFftPlanner;
use std::f32::consts::PI;

#[derive(Debug, Clone)]
pub struct MfccConfig {
    pub n_mfcc: usize,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub top_db: f32,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            n_mfcc: 40,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            top_db: 80.0,
        }
    }
}

const AMIN: f32 = 1e-10;

fn hz_to_mel(hz: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        mel * f_sp
    }
}

/// Triangular filters, `n_mels` rows of `n_fft / 2 + 1` weights, area
/// normalized.
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let fft_freqs: Vec<f32> = (0..n_bins)
        .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);
    let mel_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (left, center, right) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
            let norm = 2.0 / (right - left);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - left) / (center - left);
                    let upper = (right - f) / (right - center);
                    lower.min(upper).max(0.0) * norm
                })
                .collect()
        })
        .collect()
}

fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n as f32).cos())
        .collect()
}

/// Mel spectrogram in dB, one row of `n_mels` values per frame. Each
/// frame's power spectrum is projected onto the filterbank right away and
/// never kept.
fn mel_spectrogram_db(
    samples: &[f32],
    sample_rate: u32,
    config: &MfccConfig,
) -> Result<Vec<Vec<f32>>, EmotionError> {
    let n_fft = config.n_fft;
    let pad = n_fft / 2;
    let padded_len = samples.len() + 2 * pad;
    // Centered frames read zeros outside the signal
    let sample_at = |index: usize| -> f32 {
        index
            .checked_sub(pad)
            .and_then(|i| samples.get(i))
            .copied()
            .unwrap_or(0.0)
    };

    let n_frames = 1 + (padded_len - n_fft) / config.hop_length;
    let window = hann_window(n_fft);
    let filterbank = mel_filterbank(sample_rate, n_fft, config.n_mels);

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();
    let mut power = vec![0.0f32; spectrum.len()];

    let mut frames = Vec::with_capacity(n_frames);
    for frame in 0..n_frames {
        let start = frame * config.hop_length;
        for (i, value) in input.iter_mut().enumerate() {
            *value = sample_at(start + i) * window[i];
        }
        fft.process(&mut input, &mut spectrum)
            .map_err(|e| EmotionError::Inference(format!("fft failed: {}", e)))?;
        for (p, c) in power.iter_mut().zip(&spectrum) {
            *p = c.norm_sqr();
        }
        frames.push(
            filterbank
                .iter()
                .map(|filter| {
                    let energy: f32 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                    10.0 * energy.max(AMIN).log10()
                })
                .collect(),
        );
    }
    Ok(frames)
}

fn dct_ortho(input: &[f32], n_out: usize) -> Vec<f32> {
    let n = input.len() as f32;
    (0..n_out)
        .map(|k| {
            let sum: f32 = input
                .iter()
                .enumerate()
                .map(|(i, x)| x * (PI * k as f32 * (2.0 * i as f32 + 1.0) / (2.0 * n)).cos())
                .sum();
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * scale
        })
        .collect()
}

/// Per-frame MFCC matrix (`frames x n_mfcc`).
pub fn mfcc(
    samples: &[f32],
    sample_rate: u32,
    config: &MfccConfig,
) -> Result<Vec<Vec<f32>>, EmotionError> {
    if samples.is_empty() {
        return Err(EmotionError::InvalidInput("empty audio".to_string()));
    }
    if sample_rate == 0 || config.n_mfcc > config.n_mels {
        return Err(EmotionError::InvalidInput(
            "invalid MFCC parameters".to_string(),
        ));
    }

    let mut mel_db = mel_spectrogram_db(samples, sample_rate, config)?;

    let peak = mel_db
        .iter()
        .flatten()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    let floor = peak - config.top_db;
    for value in mel_db.iter_mut().flatten() {
        *value = value.max(floor);
    }

    Ok(mel_db
        .iter()
        .map(|frame| dct_ortho(frame, config.n_mfcc))
        .collect())
}

/// MFCCs averaged over time, the speech classifier's input vector.
pub fn mean_mfcc(
    samples: &[f32],
    sample_rate: u32,
    config: &MfccConfig,
) -> Result<Vec<f32>, EmotionError> {
    let frames = mfcc(samples, sample_rate, config)?;
    let mut mean = vec![0.0f32; config.n_mfcc];
    for frame in &frames {
        for (acc, value) in mean.iter_mut().zip(frame) {
            *acc += value;
        }
    }
    let count = frames.len().max(1) as f32;
    mean.iter_mut().for_each(|v| *v /= count);
    Ok(mean)
}
