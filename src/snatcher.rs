use std::path::{Path, PathBuf};

use log::{error, info, warn};
use reqwest::Client;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::SnatchError;

/// Something that can copy a remote photo to local storage.
#[allow(async_fn_in_trait)]
pub trait PhotoSnatch {
    async fn snatch(&self, url: &str, filename: &str) -> Result<PathBuf, SnatchError>;
}

/// Streams photos into a single local folder.
///
/// Snatching to a filename that already exists overwrites it, so a photo that failed half way
/// through last time is simply fetched again.
pub struct PhotoSnatcher {
    client: Client,
    photos_dir: PathBuf,
}

impl PhotoSnatcher {
    pub fn new(client: Client, photos_dir: PathBuf) -> Self {
        Self { client, photos_dir }
    }

    pub fn photos_dir(&self) -> &Path {
        &self.photos_dir
    }

    /// Make sure the photos folder exists. Safe to call every start-up.
    pub async fn ensure_dir(&self) -> Result<(), SnatchError> {
        fs::create_dir_all(&self.photos_dir).await?;
        Ok(())
    }

    fn destination(&self, filename: &str) -> Result<PathBuf, SnatchError> {
        if filename.is_empty()
            || filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
        {
            return Err(SnatchError::InvalidFilename(filename.to_string()));
        }
        Ok(self.photos_dir.join(filename))
    }

    async fn stream_to(&self, url: &str, file: &mut File) -> Result<(), SnatchError> {
        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(SnatchError::Status(response.status().as_u16()));
        }

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

impl PhotoSnatch for PhotoSnatcher {
    async fn snatch(&self, url: &str, filename: &str) -> Result<PathBuf, SnatchError> {
        info!("Snatching photo from {} to {}...", url, filename);
        let path = self.destination(filename)?;

        let mut file = File::create(&path).await?;
        let result = self.stream_to(url, &mut file).await;
        drop(file);

        match result {
            Ok(()) => {
                info!("Photo saved to {}", filename);
                Ok(path)
            }
            Err(e) => {
                error!("Error snatching photo from {}: {}", url, e);
                if let Err(cleanup) = fs::remove_file(&path).await {
                    warn!("Could not remove partial photo {}: {}", path.display(), cleanup);
                }
                Err(e)
            }
        }
    }
}
