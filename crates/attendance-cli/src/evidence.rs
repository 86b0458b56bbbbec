use anyhow::{Context, Result};
use attendance_api::{Attachment, CapturedInfo};
use attendance_scan::CapturedEvidence;
use image::ImageReader;
use std::io::Cursor;
use std::path::Path;

/// Load a captured photo and read its dimensions.
pub async fn load_photo(path: &Path) -> Result<CapturedEvidence> {
    let photo = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read photo {}", path.display()))?;
    let (width, height) = dimensions(&photo)
        .with_context(|| format!("{} is not a readable image", path.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(capture_file_name);

    tracing::debug!(width, height, bytes = photo.len(), "evidence photo loaded");

    Ok(CapturedEvidence {
        photo,
        file_name,
        width,
        height,
        captured_at: chrono::Utc::now(),
    })
}

fn dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}

fn capture_file_name() -> String {
    format!("capture_{}.jpg", chrono::Utc::now().timestamp_millis())
}

pub fn captured_info(evidence: &CapturedEvidence) -> CapturedInfo {
    CapturedInfo {
        w: evidence.width,
        h: evidence.height,
        size: evidence.photo.len(),
        time: evidence
            .captured_at
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    }
}

pub fn photo_attachment(evidence: CapturedEvidence) -> Attachment {
    Attachment::new("photo", &evidence.file_name, evidence.photo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_load_photo_reads_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        image::RgbImage::new(32, 24).save(&path).unwrap();

        let ev = load_photo(&path).await.unwrap();
        assert_eq!((ev.width, ev.height), (32, 24));
        assert_eq!(ev.file_name, "face.png");
        assert!(!ev.photo.is_empty());
    }

    #[tokio::test]
    async fn test_load_photo_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "not an image").unwrap();
        assert!(load_photo(&path).await.is_err());
    }

    #[test]
    fn test_captured_info() {
        let ev = CapturedEvidence {
            photo: vec![0u8; 2048],
            file_name: "capture.jpg".into(),
            width: 1280,
            height: 720,
            captured_at: chrono::Utc.with_ymd_and_hms(2026, 10, 14, 1, 0, 0).unwrap(),
        };
        let info = captured_info(&ev);
        assert_eq!((info.w, info.h, info.size), (1280, 720, 2048));
        assert_eq!(info.time, "2026-10-14T01:00:00.000Z");
        assert_eq!(photo_attachment(ev).mime, "image/jpeg");
    }
}
