use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::UploadError;

#[derive(Debug, Deserialize)]
struct MediaInfo {
    // absent when mediainfo could not read the file at all
    media: Option<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    track: Vec<Track>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "@type")]
enum Track {
    #[serde(rename = "General")]
    General {
        #[serde(rename = "Duration")]
        duration: Option<String>,
    },
    #[serde(rename = "Video")]
    Video {
        #[serde(rename = "Duration")]
        duration: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Measures the playback length of a video file in seconds with the `mediainfo` command line tool.
pub async fn probe_duration(path: &Path) -> Result<Option<f64>, UploadError> {
    let output = Command::new("mediainfo")
        .arg("--Output=JSON")
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| UploadError::Probe(format!("failed to run mediainfo: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::error!("MediaInfo command failed with status {:?}: {}", output.status, stderr);
        return Err(UploadError::Probe(format!("mediainfo exited with {}", output.status)));
    }

    parse_duration(&String::from_utf8_lossy(&output.stdout))
}

/// Duration from mediainfo JSON output. The general track wins over the video track; everything is a
/// string in MediaInfo, so unparseable values count as missing.
fn parse_duration(json: &str) -> Result<Option<f64>, UploadError> {
    let media_info: MediaInfo = serde_json::from_str(json)
        .map_err(|err| UploadError::Probe(format!("unreadable mediainfo output: {err}")))?;

    let Some(media) = media_info.media else {
        return Ok(None);
    };

    let seconds = |duration: &Option<String>| {
        duration
            .as_deref()
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value >= 0.0)
    };

    let general = media.track.iter().find_map(|track| match track {
        Track::General { duration } => seconds(duration),
        _ => None,
    });
    let video = media.track.iter().find_map(|track| match track {
        Track::Video { duration } => seconds(duration),
        _ => None,
    });

    Ok(general.or(video))
}
