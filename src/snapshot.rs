//! PNG export of the active render surface.

use std::io::Cursor;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AnalyzerError, Result};
use crate::render::Raster;

/// Host capability that persists an encoded snapshot.
pub trait SaveTarget {
    /// Stores `bytes` under `filename`, returning where it ended up.
    fn save(&mut self, filename: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Writes snapshots into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySaveTarget {
    dir: PathBuf,
}

impl DirectorySaveTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SaveTarget for DirectorySaveTarget {
    fn save(&mut self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(filename);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOutcome {
    Saved(PathBuf),
    /// Nothing is being rendered; no file was written.
    NoSurfaceAttached,
}

/// Milliseconds since the Unix epoch, as used in snapshot filenames.
pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// `spectrogram-<label>-<millis>.png`, with separators and whitespace in the
/// label replaced by `_`.
pub fn snapshot_filename(label: &str, timestamp_millis: u128) -> String {
    let label: String = label
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect();
    format!("spectrogram-{}-{}.png", label, timestamp_millis)
}

/// PNG bytes of an RGBA surface.
pub fn encode_png(surface: &Raster) -> Result<Vec<u8>> {
    let width = u32::try_from(surface.width())
        .map_err(|_| AnalyzerError::Snapshot("surface too wide".into()))?;
    let height = u32::try_from(surface.height())
        .map_err(|_| AnalyzerError::Snapshot("surface too tall".into()))?;

    let mut out = Cursor::new(Vec::new());
    image::write_buffer_with_format(
        &mut out,
        surface.pixels(),
        width,
        height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )?;
    Ok(out.into_inner())
}

/// Encodes `surface` and hands it to `target`.
pub fn export_snapshot<T>(
    surface: Option<&Raster>,
    label: &str,
    timestamp_millis: u128,
    target: &mut T,
) -> Result<SnapshotOutcome>
where
    T: SaveTarget + ?Sized,
{
    let Some(surface) = surface else {
        log::debug!("Snapshot requested with no surface attached");
        return Ok(SnapshotOutcome::NoSurfaceAttached);
    };

    let bytes = encode_png(surface)?;
    let filename = snapshot_filename(label, timestamp_millis);
    let path = target.save(&filename, &bytes)?;

    log::info!(
        "Saved {}x{} snapshot to {}",
        surface.width(),
        surface.height(),
        path.display()
    );
    Ok(SnapshotOutcome::Saved(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MemoryTarget {
        saved: Vec<(String, Vec<u8>)>,
    }

    impl SaveTarget for MemoryTarget {
        fn save(&mut self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
            self.saved.push((filename.to_string(), bytes.to_vec()));
            Ok(PathBuf::from(filename))
        }
    }

    #[test]
    fn test_filename_format() {
        assert_eq!(
            snapshot_filename("live", 1_700_000_000_123),
            "spectrogram-live-1700000000123.png"
        );
        assert_eq!(
            snapshot_filename("my song/part 2.wav", 5),
            "spectrogram-my_song_part_2.wav-5.png"
        );
    }

    #[test]
    fn test_no_surface_writes_nothing() {
        let mut target = MemoryTarget::default();
        let outcome = export_snapshot(None, "live", 1, &mut target).unwrap();
        assert_eq!(outcome, SnapshotOutcome::NoSurfaceAttached);
        assert!(target.saved.is_empty());
    }

    #[test]
    fn test_png_roundtrips_through_decoder() {
        let mut raster = Raster::new(4, 3, [0, 0, 0]);
        raster.set_pixel(2, 1, [250, 10, 20]);

        let mut target = MemoryTarget::default();
        let outcome = export_snapshot(Some(&raster), "tone.wav", 42, &mut target).unwrap();
        assert_eq!(
            outcome,
            SnapshotOutcome::Saved(PathBuf::from("spectrogram-tone.wav-42.png"))
        );

        let (_, bytes) = &target.saved[0];
        let decoded = image::load_from_memory(bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(2, 1).0, [250, 10, 20, 255]);
        assert_eq!(decoded.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_directory_target_writes_file() {
        let dir = std::env::temp_dir().join(format!("sonoscope-snap-{}", std::process::id()));
        let mut target = DirectorySaveTarget::new(&dir);
        let raster = Raster::new(2, 2, [1, 2, 3]);

        let outcome = export_snapshot(Some(&raster), "live", 7, &mut target).unwrap();
        let path = dir.join("spectrogram-live-7.png");
        assert_eq!(outcome, SnapshotOutcome::Saved(path.clone()));
        assert!(path.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
