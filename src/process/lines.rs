use futures::stream::{self, Stream};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

const DEFAULT_CAPACITY: usize = 64 * 1024;
const BOM: char = '\u{feff}';

/// Lazily splits an async byte source into text lines.
///
/// Lines are cut on `\n` at the byte level and only then decoded, so a
/// multi-byte character that straddles two reads is never torn apart.
/// Invalid UTF-8 is replaced rather than rejected.
pub struct LineStream<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    first: bool,
}

impl<R: AsyncRead + Unpin> LineStream<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, reader)
    }

    /// `capacity` bounds how many bytes are pulled from `reader` per read.
    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(capacity.max(1), reader),
            buf: Vec::new(),
            first: true,
        }
    }

    /// Next line without its `\n` / `\r\n`, or `None` once the source is
    /// exhausted. A final line with no terminator is still returned.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }

        let mut line = String::from_utf8_lossy(&self.buf).into_owned();
        if self.first {
            self.first = false;
            if line.starts_with(BOM) {
                line.remove(0);
            }
        }
        Ok(Some(line))
    }

    pub fn into_stream(self) -> impl Stream<Item = io::Result<String>> {
        stream::try_unfold(self, |mut lines| async move {
            Ok::<_, io::Error>(lines.next_line().await?.map(|line| (line, lines)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn reassembles_multibyte_chars_across_reads() -> Result<()> {
        let text = "GEOID|NAME\n0600001|Cañón City\nzß水🍣";
        // one byte per read forces every multi-byte char to straddle reads
        let mut lines = LineStream::with_capacity(1, text.as_bytes());

        assert_eq!(lines.next_line().await?.as_deref(), Some("GEOID|NAME"));
        assert_eq!(lines.next_line().await?.as_deref(), Some("0600001|Cañón City"));
        assert_eq!(lines.next_line().await?.as_deref(), Some("zß水🍣"));
        assert_eq!(lines.next_line().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn strips_crlf_and_bom() -> Result<()> {
        let text = "\u{feff}\"GEO_ID\",\"NAME\"\r\n\r\nlast\r\n";
        let all: Vec<String> = LineStream::new(text.as_bytes())
            .into_stream()
            .try_collect()
            .await?;
        assert_eq!(all, vec!["\"GEO_ID\",\"NAME\"", "", "last"]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_source_yields_nothing() -> Result<()> {
        let mut lines = LineStream::new(&b""[..]);
        assert_eq!(lines.next_line().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() -> Result<()> {
        let bytes: &[u8] = b"ok\n\xff\xfeabc";
        let all: Vec<String> = LineStream::new(bytes).into_stream().try_collect().await?;
        assert_eq!(all[0], "ok");
        assert!(all[1].ends_with("abc"));
        assert!(all[1].contains('\u{fffd}'));
        Ok(())
    }
}
