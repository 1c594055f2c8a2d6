//! Line framing shared by the NDJSON (Ollama) and SSE (Gemini) streaming readers.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::LlmError;
use crate::provider::DeltaStream;
use crate::types::ProviderKind;

/// One decoded line of a streamed upstream response.
#[derive(Debug, PartialEq)]
pub(crate) enum Frame {
    /// A text fragment to forward.
    Text(String),
    /// The upstream signalled the end of the answer.
    Done,
    /// Nothing to forward (keep-alives, empty deltas, comments).
    Skip,
}

/// How a well-formed upstream stream finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    /// An explicit final frame must arrive; EOF before it is a truncated reply.
    DoneFrame,
    /// End of body is a normal finish.
    Eof,
}

struct LineReader {
    body: BoxStream<'static, Result<Bytes, reqwest::Error>>,
    buf: Vec<u8>,
    eof: bool,
}

impl LineReader {
    /// Next complete line, without the trailing `\n` / `\r\n`.
    async fn next_line(&mut self) -> Option<Result<String, reqwest::Error>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Some(Ok(String::from_utf8_lossy(&line).into_owned()));
            }
            if self.eof {
                if self.buf.is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut self.buf);
                return Some(Ok(String::from_utf8_lossy(&rest).into_owned()));
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.eof = true;
                    self.buf.clear();
                    return Some(Err(e));
                }
                None => self.eof = true,
            }
        }
    }
}

/// Turn a response body into a stream of text deltas using `parse` per line.
///
/// The stream ends at the first [`Frame::Done`], or at end of body when
/// `end` is [`StreamEnd::Eof`]. Transport errors, parse errors and a body
/// cut short are yielded once and end the stream.
pub(crate) fn deltas<F>(
    provider: ProviderKind,
    body: BoxStream<'static, Result<Bytes, reqwest::Error>>,
    end: StreamEnd,
    parse: F,
) -> DeltaStream
where
    F: Fn(&str) -> Result<Frame, LlmError> + Send + Sync + 'static,
{
    let reader = LineReader { body, buf: Vec::new(), eof: false };
    stream::unfold(Some((reader, parse)), move |state| async move {
        let (mut reader, parse) = state?;
        loop {
            let line = match reader.next_line().await {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Some((Err(LlmError::from_transport(provider, e)), None)),
                None if end == StreamEnd::DoneFrame => return Some((Err(LlmError::Truncated(provider)), None)),
                None => return None,
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match parse(trimmed) {
                Ok(Frame::Text(text)) => return Some((Ok(text), Some((reader, parse)))),
                Ok(Frame::Skip) => continue,
                Ok(Frame::Done) => return None,
                Err(e) => return Some((Err(e), None)),
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod test {
    use super::*;

    fn body(chunks: &[&'static str]) -> BoxStream<'static, Result<Bytes, reqwest::Error>> {
        let owned: Vec<Result<Bytes, reqwest::Error>> =
            chunks.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
        stream::iter(owned).boxed()
    }

    fn echo(line: &str) -> Result<Frame, LlmError> {
        match line {
            "END" => Ok(Frame::Done),
            "#" => Ok(Frame::Skip),
            other => Ok(Frame::Text(other.to_owned())),
        }
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let out: Vec<String> = deltas(ProviderKind::Ollama, body(&["al", "pha\nbe", "ta\r\n"]), StreamEnd::Eof, echo)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn stops_at_done_and_skips_noise() {
        let out: Vec<String> = deltas(ProviderKind::Ollama, body(&["a\n#\n\nEND\nb\n"]), StreamEnd::DoneFrame, echo)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["a"]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_emitted() {
        let out: Vec<String> = deltas(ProviderKind::Gemini, body(&["x\ny"]), StreamEnd::Eof, echo)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn multibyte_characters_survive_chunk_boundaries() {
        let bytes = "é\n".as_bytes();
        let (a, b) = bytes.split_at(1);
        let chunks: Vec<Result<Bytes, reqwest::Error>> =
            vec![Ok(Bytes::copy_from_slice(a)), Ok(Bytes::copy_from_slice(b))];
        let out: Vec<String> = deltas(ProviderKind::Ollama, stream::iter(chunks).boxed(), StreamEnd::Eof, echo)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["é"]);
    }

    #[tokio::test]
    async fn eof_before_done_frame_is_truncated() {
        let out: Vec<Result<String, LlmError>> =
            deltas(ProviderKind::Ollama, body(&["a\nb\n"]), StreamEnd::DoneFrame, echo).collect().await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap(), "a");
        assert_eq!(out[1].as_ref().unwrap(), "b");
        assert!(matches!(out[2], Err(LlmError::Truncated(ProviderKind::Ollama))));
    }
}
