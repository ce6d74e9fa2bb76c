use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};

use crate::providers::ImageResult;

#[derive(Serialize)]
struct Sidecar<'a> {
    term: &'a str,
    style: &'a str,
    prompt: &'a str,
    model: &'a str,
    mime_type: &'a str,
    bytes: usize,
    created_at: String,
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut f = fs::File::create(&tmp).await?;
        f.write_all(bytes).await?;
        let _ = f.sync_all().await; // best-effort
    }
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Writes the image to `out` and a `<out>.json` sidecar describing it.
/// Returns the sidecar path.
pub async fn save_output(out: &Path, term: &str, style: &str, res: &ImageResult) -> anyhow::Result<PathBuf> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    write_atomic(out, &res.bytes).await?;

    let sidecar = Sidecar {
        term,
        style,
        prompt: &res.prompt_used,
        model: &res.model,
        mime_type: &res.mime_type,
        bytes: res.bytes.len(),
        created_at: Utc::now().to_rfc3339(),
    };
    let mut json = out.as_os_str().to_owned();
    json.push(".json");
    let json = PathBuf::from(json);
    write_atomic(&json, &serde_json::to_vec_pretty(&sidecar)?).await?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_image_and_sidecar() {
        let dir = std::env::temp_dir().join(format!("jargonviz-io-{}", uuid::Uuid::new_v4()));
        let out = dir.join("nested").join("whale.png");
        let res = ImageResult {
            bytes: b"ABC".to_vec(),
            mime_type: "image/png".into(),
            prompt_used: "a whale".into(),
            model: "mock".into(),
        };

        let sidecar = save_output(&out, "whale", "Goblin", &res).await.unwrap();
        assert_eq!(fs::read(&out).await.unwrap(), b"ABC");

        let meta: serde_json::Value = serde_json::from_slice(&fs::read(&sidecar).await.unwrap()).unwrap();
        assert_eq!(meta["term"], "whale");
        assert_eq!(meta["style"], "Goblin");
        assert_eq!(meta["prompt"], "a whale");
        assert_eq!(meta["bytes"], 3);

        let _ = fs::remove_dir_all(&dir).await;
    }
}
