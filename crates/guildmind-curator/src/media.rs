use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use crate::error::CuratorError;

/// Convert GIF bytes to MP4 via ffmpeg, for platforms that reject GIFs.
/// Requires ffmpeg on PATH; a missing binary surfaces as a conversion
/// error the pipeline treats as "keep the original".
pub async fn gif_to_mp4(gif_bytes: &[u8]) -> Result<Vec<u8>, CuratorError> {
    let tmp = std::env::temp_dir();
    let id = Uuid::new_v4();
    let input = tmp.join(format!("gm-{id}.gif"));
    let output = tmp.join(format!("gm-{id}.mp4"));

    tokio::fs::write(&input, gif_bytes)
        .await
        .map_err(|e| CuratorError::Conversion(e.to_string()))?;

    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(&input)
        .args(["-movflags", "faststart", "-pix_fmt", "yuv420p"])
        // Even dimensions required by yuv420p.
        .args(["-vf", "scale=trunc(iw/2)*2:trunc(ih/2)*2"])
        .arg(&output)
        .status()
        .await
        .map_err(|e| CuratorError::Conversion(format!("ffmpeg spawn failed: {e}")));

    let result = match status {
        Ok(s) if s.success() => tokio::fs::read(&output)
            .await
            .map_err(|e| CuratorError::Conversion(e.to_string())),
        Ok(s) => Err(CuratorError::Conversion(format!("ffmpeg exited with {s}"))),
        Err(e) => Err(e),
    };

    let _ = tokio::fs::remove_file(&input).await;
    let _ = tokio::fs::remove_file(&output).await;

    if result.is_ok() {
        debug!(bytes = gif_bytes.len(), "gif converted to mp4");
    }
    result
}

/// Rewrite `x.gif` to `x.mp4` after conversion.
pub fn mp4_filename(gif_filename: &str) -> String {
    match gif_filename.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.mp4"),
        None => format!("{gif_filename}.mp4"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_rewrite() {
        assert_eq!(mp4_filename("dance.gif"), "dance.mp4");
        assert_eq!(mp4_filename("noext"), "noext.mp4");
    }
}
