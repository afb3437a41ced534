/// Generative-AI provider abstraction
///
/// The governor talks to the provider only through [`GenerativeProvider`].
/// Streaming and single-shot backends both hand back a [`TextStream`], so
/// consumers read every response the same way.
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::error::ProviderFailure;

pub mod gemini;

pub use gemini::GeminiProvider;

/// Image attached to a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl InlineImage {
    /// Wraps raw bytes, guessing the MIME type from the file signature
    pub fn sniff(bytes: Vec<u8>) -> Self {
        Self {
            mime_type: sniff_mime_type(&bytes).to_string(),
            bytes,
        }
    }
}

/// Guesses an image MIME type from magic bytes; JPEG when unrecognized
pub fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

/// One provider call: a text prompt, optionally with an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, image: InlineImage) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
        }
    }
}

/// A fragment of generated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
}

/// Lazy, finite sequence of [`TextChunk`]s. It is consumed by value and
/// cannot be restarted.
pub struct TextStream {
    inner: BoxStream<'static, Result<TextChunk, ProviderFailure>>,
}

impl TextStream {
    /// Single-shot response as a one-chunk stream
    pub fn once(text: impl Into<String>) -> Self {
        let chunk = TextChunk { text: text.into() };
        Self {
            inner: stream::once(async move { Ok(chunk) }).boxed(),
        }
    }

    pub fn empty() -> Self {
        Self {
            inner: stream::empty().boxed(),
        }
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<TextChunk, ProviderFailure>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// Drains the stream into one string, stopping at the first error
    pub async fn collect_text(mut self) -> Result<String, ProviderFailure> {
        let mut text = String::new();
        while let Some(chunk) = self.inner.next().await {
            text.push_str(&chunk?.text);
        }
        Ok(text)
    }
}

impl Stream for TextStream {
    type Item = Result<TextChunk, ProviderFailure>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for TextStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextStream").finish_non_exhaustive()
    }
}

/// Trait for generative-AI backends
///
/// One `generate` call is exactly one provider attempt. Implementations report
/// failures as [`ProviderFailure`] text and leave retrying to the governor.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerativeProvider: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<TextStream, ProviderFailure>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_once_collects_to_text() {
        let text = TextStream::once("Spike Spiegel").collect_text().await.unwrap();
        assert_eq!(text, "Spike Spiegel");
    }

    #[tokio::test]
    async fn test_chunks_concatenate_in_order() {
        let chunks = vec!["A ", "bounty ", "hunter"]
            .into_iter()
            .map(|t| Ok(TextChunk { text: t.to_string() }));
        let text = TextStream::from_stream(stream::iter(chunks))
            .collect_text()
            .await
            .unwrap();
        assert_eq!(text, "A bounty hunter");
    }

    #[tokio::test]
    async fn test_mid_stream_error_surfaces() {
        let items = vec![
            Ok(TextChunk { text: "partial".to_string() }),
            Err(ProviderFailure::api("connection reset")),
        ];
        let result = TextStream::from_stream(stream::iter(items)).collect_text().await;
        assert_eq!(result, Err(ProviderFailure::api("connection reset")));
    }

    #[tokio::test]
    async fn test_stream_is_consumable_chunk_by_chunk() {
        let mut stream = TextStream::once("x");
        assert_eq!(
            stream.next().await,
            Some(Ok(TextChunk { text: "x".to_string() }))
        );
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        assert_eq!(TextStream::empty().collect_text().await.unwrap(), "");
    }

    #[test]
    fn test_sniff_mime_type() {
        assert_eq!(sniff_mime_type(&[0x89, b'P', b'N', b'G', 0x0D]), "image/png");
        assert_eq!(sniff_mime_type(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_mime_type(b"GIF89a"), "image/gif");
        assert_eq!(sniff_mime_type(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff_mime_type(b"??"), "image/jpeg");
    }
}
