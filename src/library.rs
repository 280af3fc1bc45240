//! Folder scan producing the track list.

use std::path::{Path, PathBuf};

/// Audio-bearing file offered to the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackHandle {
    pub name: String,
    pub byte_size: u64,
    pub mime_type: String,
    pub path: PathBuf,
}

/// MIME type for a supported extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "wav" => Some("audio/wav"),
        "flac" => Some("audio/flac"),
        "mp3" => Some("audio/mpeg"),
        "ogg" | "oga" => Some("audio/ogg"),
        "m4a" | "mp4" => Some("audio/mp4"),
        "aac" => Some("audio/aac"),
        _ => None,
    }
}

/// Lists the audio files directly inside `dir`, sorted by name.
pub fn scan_folder(dir: &Path) -> std::io::Result<Vec<TrackHandle>> {
    let mut tracks = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        let mime = match path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_for_extension)
        {
            Some(m) => m,
            None => continue,
        };

        tracks.push(TrackHandle {
            name: entry.file_name().to_string_lossy().into_owned(),
            byte_size: metadata.len(),
            mime_type: mime.to_string(),
            path,
        });
    }

    tracks.sort_by(|a, b| a.name.cmp(&b.name));
    log::info!("Scanned {}: {} track(s)", dir.display(), tracks.len());
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = std::env::temp_dir().join(format!("sonoscope-scan-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("b.WAV"), b"1234").unwrap();
        std::fs::write(dir.join("a.mp3"), b"12").unwrap();
        std::fs::write(dir.join("notes.txt"), b"x").unwrap();
        std::fs::create_dir_all(dir.join("sub.wav")).unwrap();

        let tracks = scan_folder(&dir).unwrap();
        let names: Vec<_> = tracks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a.mp3", "b.WAV"]);
        assert_eq!(tracks[0].mime_type, "audio/mpeg");
        assert_eq!(tracks[1].byte_size, 4);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
