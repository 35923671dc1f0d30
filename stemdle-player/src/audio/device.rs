//! Sound-device backend
//!
//! Fetches each stem (HTTP or local file), decodes the part of it a round can
//! reach, and adds it to the output mixer.

use super::decoder::{extension_hint, StemDecoder};
use super::output::{AudioOutput, DeviceStem, Voice};
use super::{AudioContext, StemOutput, StemSource};
use crate::error::{Error, Result};
use crate::snippet::SnippetWindow;
use crate::stems::StemTrack;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Decoded span extends this far past the snippet end
const DECODE_MARGIN_SECS: f64 = 1.0;

pub struct DeviceBackend {
    output: Arc<AudioOutput>,
    http: reqwest::Client,
}

impl DeviceBackend {
    pub fn open(device_name: Option<String>, request_timeout: Duration) -> Result<Self> {
        let output = Arc::new(AudioOutput::open(device_name)?);
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self { output, http })
    }

    /// Shared output, used as the engine's audio context
    pub fn context(&self) -> Arc<dyn AudioContext> {
        Arc::clone(&self.output) as Arc<dyn AudioContext>
    }

    pub fn output(&self) -> &Arc<AudioOutput> {
        &self.output
    }

    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let response = self.http.get(location).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Api {
                    status: status.as_u16(),
                    message: format!("Failed to fetch {}", location),
                });
            }
            Ok(response.bytes().await?.to_vec())
        } else {
            let path = location.strip_prefix("file://").unwrap_or(location);
            Ok(tokio::fs::read(path).await?)
        }
    }
}

impl StemSource for DeviceBackend {
    fn open<'a>(
        &'a self,
        track: &'a StemTrack,
        window: SnippetWindow,
    ) -> BoxFuture<'a, Result<Arc<dyn StemOutput>>> {
        async move {
            debug!("Fetching stem {} from {}", track.kind, track.source_url);
            let bytes = self.fetch(&track.source_url).await?;

            let extension = extension_hint(&track.source_url).map(str::to_string);
            let start = window.start_offset();
            let end = start + window.length() + DECODE_MARGIN_SECS;
            let decoded = tokio::task::spawn_blocking(move || {
                StemDecoder::decode_bytes(bytes, extension.as_deref(), start, Some(end))
            })
            .await
            .map_err(|e| Error::Decode(format!("Decode task failed: {}", e)))??;

            info!(
                "Loaded stem {}: {:.2}s..{:.2}s at {} Hz",
                track.kind,
                decoded.start_secs(),
                decoded.end_secs(),
                decoded.sample_rate
            );

            let voice = Arc::new(Voice::new(track.kind, decoded));
            let mixer = self.output.mixer();
            mixer.add(Arc::clone(&voice));
            Ok(Arc::new(DeviceStem::new(voice, mixer)) as Arc<dyn StemOutput>)
        }
        .boxed()
    }
}
