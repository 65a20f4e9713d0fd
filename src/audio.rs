use mp3lame_encoder::{max_required_buffer_size, Bitrate, Builder, FlushNoGap, MonoPcm, Quality};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Converts a finished call recording from WAV to MP3 and lays it out under
/// `<mp3_root>/<year>/<month>/<day>/<basename>.mp3`, creating directories as needed.
///
/// Grounded on `AudioFileManager.convert_wav_to_mp3`: the source recording is always a
/// mono PCM WAV file produced by the PBX's call-recording feature; the trailing three
/// path components of `wav_path` are assumed to be year/month/day. The source file is
/// always retained (§9 Q1). Missing input or any encode failure yields `None` rather
/// than propagating an error, matching §4.8 / §7 K4: finalization proceeds without the
/// attachment.
pub fn convert_wav_to_mp3(wav_path: &Path, mp3_root: &Path) -> Option<PathBuf> {
    if !wav_path.exists() {
        error!(path = %wav_path.display(), "recording file not found");
        return None;
    }

    let components: Vec<_> = wav_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if components.len() < 4 {
        error!(path = %wav_path.display(), "recording path too short to derive year/month/day");
        return None;
    }
    let len = components.len();
    let (year, month, day) = (&components[len - 4], &components[len - 3], &components[len - 2]);

    let mp3_filename = format!(
        "{}.mp3",
        wav_path.file_stem().map(|s| s.to_string_lossy().to_string())?
    );
    let mp3_path = mp3_root.join(year).join(month).join(day).join(mp3_filename);

    if let Some(parent) = mp3_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!(dir = %parent.display(), error = %e, "failed to create recording output directory");
            return None;
        }
    }

    match encode_wav_to_mp3(wav_path, &mp3_path) {
        Ok(()) => {
            debug!(path = %mp3_path.display(), "converted recording to mp3");
            Some(mp3_path)
        }
        Err(e) => {
            error!(wav = %wav_path.display(), error = %e, "failed to convert recording to mp3");
            None
        }
    }
}

fn encode_wav_to_mp3(wav_path: &Path, mp3_path: &Path) -> Result<(), String> {
    let mut reader = hound::WavReader::open(wav_path).map_err(|e| e.to_string())?;
    let spec = reader.spec();
    if spec.channels != 1 {
        warn!(channels = spec.channels, "recording is not mono, encoding first channel-interleaved stream as-is");
    }

    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v * i16::MAX as f32) as i16))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?,
    };

    let mut builder = Builder::new().ok_or("failed to construct mp3 encoder builder")?;
    builder
        .set_num_channels(1)
        .map_err(|e| format!("{e:?}"))?;
    builder
        .set_sample_rate(spec.sample_rate)
        .map_err(|e| format!("{e:?}"))?;
    builder
        .set_brate(Bitrate::Kbps128)
        .map_err(|e| format!("{e:?}"))?;
    builder
        .set_quality(Quality::Good)
        .map_err(|e| format!("{e:?}"))?;
    let mut encoder = builder.build().map_err(|e| format!("{e:?}"))?;

    let input = MonoPcm(&samples);
    let mut output = Vec::with_capacity(max_required_buffer_size(samples.len()));
    let written = encoder
        .encode(input, output.spare_capacity_mut())
        .map_err(|e| format!("{e:?}"))?;
    unsafe {
        output.set_len(output.len() + written);
    }
    let flushed = encoder
        .flush::<FlushNoGap>(output.spare_capacity_mut())
        .map_err(|e| format!("{e:?}"))?;
    unsafe {
        output.set_len(output.len() + flushed);
    }

    std::fs::write(mp3_path, output).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_wav_file_returns_none() {
        let missing = Path::new("/nonexistent/2024/03/15/rec.wav");
        let root = Path::new("/tmp/callbridge-mp3-test");
        assert!(convert_wav_to_mp3(missing, root).is_none());
    }
}
