//! Line-oriented report feed: each line is `<topic> <json payload>`.
//!
//! Stands in for the external broker client when running from a pipe or a
//! recorded capture. Blank lines and lines starting with `#` are skipped.

use bytes::Bytes;
use fleet_bus::Bus;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _};
use tracing::{debug, warn};

/// Split one feed line into topic and payload.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
  let line = line.trim();
  if line.is_empty() || line.starts_with('#') {
    return None;
  }
  let (topic, payload) = line.split_once(char::is_whitespace)?;
  Some((topic, payload.trim_start()))
}

/// Publish every line of `reader` on `bus`. Returns how many lines were
/// published.
pub async fn publish_lines<R>(reader: R, bus: &Bus) -> std::io::Result<u64>
where
  R: AsyncBufRead + Unpin,
{
  let mut lines = reader.lines();
  let mut published = 0;
  let mut line_no = 0u64;

  while let Some(line) = lines.next_line().await? {
    line_no += 1;
    let Some((topic, payload)) = parse_line(&line) else {
      if !line.trim().is_empty() && !line.trim_start().starts_with('#') {
        warn!(line = line_no, "feed line has no payload");
      }
      continue;
    };
    match bus.publish(topic, Bytes::copy_from_slice(payload.as_bytes())).await {
      Ok(receivers) => {
        published += 1;
        debug!(line = line_no, topic, receivers, "feed line published");
      }
      Err(e) => warn!(line = line_no, topic, error = %e, "failed to publish feed line"),
    }
  }
  Ok(published)
}
