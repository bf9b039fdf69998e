mod client;
mod error;
mod media;
mod session;

use std::env;
use std::io::stdin;
use std::path::Path;

use tracing_subscriber::EnvFilter;

use client::{run_upload, VideoServiceClient};
use error::UploadError;
use session::{FileKind, SelectedFile, UploadSession};

// Uploads a video and its thumbnail the same way the web upload page does.
//   VIDEO_SERVICE_URL=http://localhost:3000 SESSION_TOKEN=... upload-video clip.mp4 cover.png
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [video_path, thumbnail_path] = args.as_slice() else {
        eprintln!("Usage: upload-video <video-file> <thumbnail-file>");
        std::process::exit(2);
    };

    let service_url = env::var("VIDEO_SERVICE_URL").expect("VIDEO_SERVICE_URL not set");
    let session_token = env::var("SESSION_TOKEN").expect("SESSION_TOKEN not set");

    if let Err(err) = upload(&service_url, &session_token, Path::new(video_path), Path::new(thumbnail_path)).await {
        tracing::error!(step = ?err.step(), "Upload failed: {}", err);
        std::process::exit(1);
    }
}

async fn upload(service_url: &str, session_token: &str, video_path: &Path, thumbnail_path: &Path) -> Result<(), UploadError> {
    let mut session = UploadSession::default();
    session.select_video(SelectedFile::open(FileKind::Video, video_path).await?);
    session.select_thumbnail(SelectedFile::open(FileKind::Thumbnail, thumbnail_path).await?);

    match media::probe_duration(video_path).await {
        Ok(duration) => session.record_duration(duration),
        Err(err) => tracing::warn!("{}", err),
    }

    session.title = prompt("Title:")?;
    session.description = prompt("Description:")?;
    session.set_visibility(&prompt("Visibility (public/private, default public):")?)?;

    let ready = session.validate()?;
    let client = VideoServiceClient::new(service_url, session_token);
    let saved = run_upload(&client, &ready).await?;

    println!("Uploaded video {}", saved.video_id);
    Ok(())
}

fn prompt(label: &str) -> Result<String, UploadError> {
    println!("{}", label);
    let mut line = String::new();
    stdin().read_line(&mut line).map_err(|source| UploadError::Io {
        path: "stdin".to_string(),
        source,
    })?;
    Ok(line.trim().to_string())
}
