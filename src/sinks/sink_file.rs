use std::path::Path;

use tokio::fs;
use tracing::debug;

use crate::cache::token::Token;
use crate::config::settings::FileTarget;
use crate::error::{Error, Result};
use crate::sinks::TokenSink;

static FILE_MSG: &str = "file";

/// Publishes the raw access token to a file.
///
/// The token is first written to the temporary path and then renamed over
/// the final path, so readers of the final path always see a complete token.
/// Both paths must live on the same filesystem.
#[derive(Debug, Clone)]
pub struct FileSink {
    target: FileTarget,
}

impl FileSink {
    pub fn new(target: FileTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &FileTarget {
        &self.target
    }

    /// Write the token to the temporary path. The final path is untouched.
    pub(crate) async fn stage(&self, token: &Token) -> Result<()> {
        fs::write(&self.target.temp_path, token.access_token.as_bytes())
            .await
            .map_err(|source| publish_error(&self.target.temp_path, source))
    }

    /// Move the staged token over the final path.
    pub(crate) async fn commit(&self) -> Result<()> {
        fs::rename(&self.target.temp_path, &self.target.path)
            .await
            .map_err(|source| publish_error(&self.target.path, source))
    }
}

impl TokenSink for FileSink {
    fn mode(&self) -> &'static str {
        FILE_MSG
    }

    async fn publish(&self, token: &Token) -> Result<()> {
        self.stage(token).await?;
        self.commit().await?;
        debug!("token written to {}", self.target.path.display());
        Ok(())
    }
}

fn publish_error(path: &Path, source: std::io::Error) -> Error {
    Error::Publish {
        path: path.to_path_buf(),
        source,
    }
}
