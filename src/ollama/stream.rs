use futures::{ Stream, StreamExt };
use log::{ debug, warn };
use serde::Deserialize;

use super::stats::GenerationStats;

/// Returned when a stream ends without any usable text.
pub const NO_RESPONSE: &str = "No response from Ollama.";

/// One line of `/api/generate` output. Every field is optional so that the
/// final `done` object and error objects decode through the same type.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub stats: GenerationStats,
}

/// Splits a byte stream into newline-delimited JSON objects.
///
/// Bytes are held until a `\n` arrives, so a UTF-8 sequence cut across two
/// network chunks is only decoded once it is whole.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    malformed: Vec<String>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns every object completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<GenerateChunk> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(chunk) = self.parse_line(&line[..line.len() - 1]) {
                chunks.push(chunk);
            }
        }
        chunks
    }

    /// Flushes a trailing line that had no terminating newline.
    pub fn finish(&mut self) -> Option<GenerateChunk> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.parse_line(&line)
    }

    /// Text of every line that failed to parse, in arrival order.
    pub fn malformed(&self) -> &[String] {
        &self.malformed
    }

    fn parse_line(&mut self, raw: &[u8]) -> Option<GenerateChunk> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<GenerateChunk>(line) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                debug!("Skipping malformed stream line ({}): {}", e, line);
                self.malformed.push(line.to_string());
                None
            }
        }
    }
}

/// Result of draining a generation stream.
#[derive(Debug, Default, Clone)]
pub struct Ingested {
    pub text: String,
    pub stats: Option<GenerationStats>,
    pub error: Option<String>,
    pub malformed_lines: usize,
    raw_fallback: Option<String>,
}

impl Ingested {
    /// Accumulated text, or the raw body when nothing parsed, or the
    /// no-response marker.
    pub fn into_display_text(self) -> String {
        if !self.text.is_empty() {
            return self.text;
        }
        match self.raw_fallback {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => NO_RESPONSE.to_string(),
        }
    }
}

/// Drains `stream`, concatenating every `response` fragment in arrival order
/// and handing each one to `sink` as it arrives. Malformed lines are skipped.
pub async fn ingest<S, B, E, F>(stream: S, mut sink: F) -> Result<Ingested, E>
    where S: Stream<Item = Result<B, E>>, B: AsRef<[u8]>, F: FnMut(&str)
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = NdjsonDecoder::new();
    let mut out = Ingested::default();
    let mut parsed_any = false;

    while let Some(item) = stream.next().await {
        let bytes = item?;
        for chunk in decoder.feed(bytes.as_ref()) {
            parsed_any = true;
            absorb(&mut out, chunk, &mut sink);
        }
    }
    if let Some(chunk) = decoder.finish() {
        parsed_any = true;
        absorb(&mut out, chunk, &mut sink);
    }

    out.malformed_lines = decoder.malformed().len();
    if out.malformed_lines > 0 {
        warn!("Ignored {} malformed line(s) in generation stream", out.malformed_lines);
    }
    if !parsed_any && out.malformed_lines > 0 {
        out.raw_fallback = Some(decoder.malformed().join("\n"));
    }
    Ok(out)
}

fn absorb<F: FnMut(&str)>(out: &mut Ingested, chunk: GenerateChunk, sink: &mut F) {
    if let Some(fragment) = chunk.response.as_deref() {
        if !fragment.is_empty() {
            out.text.push_str(fragment);
            sink(fragment);
        }
    }
    if let Some(err) = chunk.error {
        out.error = Some(err);
    }
    if chunk.done {
        out.stats = Some(chunk.stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::convert::Infallible;

    fn byte_stream(parts: Vec<&'static str>) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(p.as_bytes().to_vec())))
    }

    #[tokio::test]
    async fn fragments_concatenate_in_order() {
        let words = ["The", " quick", " brown", " fox", " jumps"];
        let body: Vec<String> = words
            .iter()
            .map(|w| format!("{}\n", serde_json::json!({ "response": w, "done": false })))
            .collect();
        let parts: Vec<Vec<u8>> = body.into_iter().map(String::into_bytes).collect();
        let s = stream::iter(parts.into_iter().map(Ok::<_, Infallible>));

        let mut seen = Vec::new();
        let out = ingest(s, |f| seen.push(f.to_string())).await.unwrap();

        assert_eq!(out.text, words.concat());
        assert_eq!(seen, words);
        assert_eq!(out.malformed_lines, 0);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let s = byte_stream(vec![
            "{\"response\":\"Hel\"}\n",
            "not json at all\n",
            "{\"response\":\"lo\"}\n{\"respo",
            "\n",
            "{\"response\":\"!\",\"done\":true}\n",
        ]);
        let out = ingest(s, |_| {}).await.unwrap();
        assert_eq!(out.text, "Hello!");
        assert_eq!(out.malformed_lines, 2);
        assert_eq!(out.into_display_text(), "Hello!");
    }

    #[tokio::test]
    async fn objects_split_across_chunks_are_joined() {
        let s = byte_stream(vec!["{\"respon", "se\":\"ab\"}\r\n{\"response\":", "\"cd\"}"]);
        let out = ingest(s, |_| {}).await.unwrap();
        assert_eq!(out.text, "abcd");
    }

    #[tokio::test]
    async fn multibyte_characters_survive_chunk_boundaries() {
        let line = "{\"response\":\"héllo 🦀\"}\n".as_bytes().to_vec();
        let crab_start = line.len() - 7;
        let parts = vec![line[..crab_start + 2].to_vec(), line[crab_start + 2..].to_vec()];
        let s = stream::iter(parts.into_iter().map(Ok::<_, Infallible>));
        let out = ingest(s, |_| {}).await.unwrap();
        assert_eq!(out.text, "héllo 🦀");
    }

    #[tokio::test]
    async fn final_object_carries_stats() {
        let s = byte_stream(vec![
            "{\"response\":\"ok\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true,\"eval_count\":12,\"eval_duration\":1000000000}\n",
        ]);
        let out = ingest(s, |_| {}).await.unwrap();
        let stats = out.stats.expect("stats");
        assert_eq!(stats.eval_count, Some(12));
        assert_eq!(stats.eval_duration, Some(1_000_000_000));
    }

    #[tokio::test]
    async fn server_error_is_recorded() {
        let s = byte_stream(vec!["{\"error\":\"model 'x' not found\"}\n"]);
        let out = ingest(s, |_| {}).await.unwrap();
        assert_eq!(out.error.as_deref(), Some("model 'x' not found"));
        assert_eq!(out.into_display_text(), NO_RESPONSE);
    }

    #[tokio::test]
    async fn non_json_body_is_returned_raw() {
        let s = byte_stream(vec!["plain text answer"]);
        let out = ingest(s, |_| {}).await.unwrap();
        assert_eq!(out.into_display_text(), "plain text answer");
    }

    #[tokio::test]
    async fn empty_stream_yields_no_response_marker() {
        let s = byte_stream(vec![]);
        let out = ingest(s, |_| {}).await.unwrap();
        assert_eq!(out.into_display_text(), NO_RESPONSE);
    }

    #[tokio::test]
    async fn transport_error_stops_ingestion() {
        let parts: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"{\"response\":\"a\"}\n".to_vec()),
            Err("connection reset".to_string()),
            Ok(b"{\"response\":\"b\"}\n".to_vec()),
        ];
        let mut seen = String::new();
        let err = ingest(stream::iter(parts), |f| seen.push_str(f)).await.unwrap_err();
        assert_eq!(err, "connection reset");
        assert_eq!(seen, "a");
    }
}
