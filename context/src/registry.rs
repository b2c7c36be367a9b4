//! Remote file registry: upload, wait until ingested, count tokens.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gemdesk_providers::{FileUpload, ModelProvider, ProviderError};
use gemdesk_types::{Content, FileRef, FileState, RemoteFile, Role, UploadedFile};
use thiserror::Error;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to process {name}{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    IngestionFailed {
        name: String,
        reason: Option<String>,
    },
    #[error("Timed out after {}s waiting for {name} to finish processing", elapsed.as_secs())]
    Timeout { name: String, elapsed: Duration },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// How long and how often to poll a file that is still `PROCESSING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Uploads content to the provider and turns it into a shelf entry.
#[derive(Clone)]
pub struct FileRegistry {
    provider: Arc<dyn ModelProvider>,
    poll: PollPolicy,
}

impl std::fmt::Debug for FileRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRegistry")
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl FileRegistry {
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProvider>, poll: PollPolicy) -> Self {
        Self { provider, poll }
    }

    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    /// Upload, wait for `ACTIVE`, then count the file's tokens.
    ///
    /// The returned entry carries `display_name`, which may differ from the
    /// name sent with the upload (link entries, converted documents).
    pub async fn upload(
        &self,
        upload: FileUpload,
        display_name: &str,
        thumbnail: Option<Vec<u8>>,
    ) -> Result<UploadedFile, RegistryError> {
        tracing::info!(
            display_name,
            mime_type = %upload.mime_type,
            bytes = upload.bytes.len(),
            "Uploading file"
        );
        let remote = self.provider.upload_file(upload).await?;
        let remote = self.wait_until_active(remote, display_name).await?;

        let file = FileRef {
            uri: remote.uri.clone(),
            mime_type: remote.mime_type.clone(),
        };
        let tokens = self
            .provider
            .count_tokens(&[Content::files(Role::User, [file])])
            .await?;

        tracing::info!(display_name, name = %remote.name, tokens, "File ready");
        Ok(UploadedFile::new(display_name, &remote, tokens, thumbnail))
    }

    async fn wait_until_active(
        &self,
        mut remote: RemoteFile,
        display_name: &str,
    ) -> Result<RemoteFile, RegistryError> {
        let started = Instant::now();
        loop {
            match &remote.state {
                FileState::Active => return Ok(remote),
                FileState::Failed(reason) => {
                    tracing::warn!(display_name, ?reason, "File ingestion failed");
                    return Err(RegistryError::IngestionFailed {
                        name: display_name.to_string(),
                        reason: reason.clone(),
                    });
                }
                FileState::Unspecified => {
                    tracing::debug!(display_name, "File state unspecified, treating as ready");
                    return Ok(remote);
                }
                FileState::Processing => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= self.poll.timeout {
                return Err(RegistryError::Timeout {
                    name: display_name.to_string(),
                    elapsed,
                });
            }
            tracing::debug!(display_name, name = %remote.name, "Still processing");
            tokio::time::sleep(self.poll.interval).await;
            remote = self.provider.get_file(&remote.name).await?;
        }
    }
}
