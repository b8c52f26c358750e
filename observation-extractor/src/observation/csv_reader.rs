use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use super::{Observation, ObservationReader};

/// Reads observations line by line from a CSV byte stream.
///
/// Only one line is buffered at a time, so arbitrarily large files can be
/// decoded without loading them into memory.
pub struct CsvReader<R> {
    lines: Lines<R>,
    row_index: i64,
}

impl<R: AsyncBufRead + Unpin> CsvReader<R> {
    /// Discards the header line and positions the reader on the first data
    /// row. Succeeds on header-only and fully empty input.
    pub async fn open(reader: R) -> io::Result<Self> {
        let mut lines = reader.lines();
        lines.next_line().await?;

        Ok(Self {
            lines,
            // Header row discarded, so the first data row is index 1.
            row_index: 0,
        })
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> ObservationReader for CsvReader<R> {
    async fn next_observation(&mut self) -> io::Result<Option<Observation>> {
        let Some(row) = self.lines.next_line().await? else {
            return Ok(None);
        };

        self.row_index += 1;
        Ok(Some(Observation {
            row,
            row_index: self.row_index,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_ROW: &str = "153223,,Person,,Count,,,,K04000001,,Sex,Sex,,All categories: Sex";

    #[tokio::test]
    async fn yields_rows_with_one_based_indices() {
        let input = format!("header\n{EXAMPLE_ROW}\n{EXAMPLE_ROW}");
        let mut reader = CsvReader::open(input.as_bytes()).await.unwrap();

        let first = reader.next_observation().await.unwrap().unwrap();
        assert_eq!(first.row, EXAMPLE_ROW);
        assert_eq!(first.row_index, 1);

        let second = reader.next_observation().await.unwrap().unwrap();
        assert_eq!(second.row, EXAMPLE_ROW);
        assert_eq!(second.row_index, 2);

        assert!(reader.next_observation().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_input_signals_end_of_data() {
        let mut reader = CsvReader::open(&b""[..]).await.unwrap();
        assert!(reader.next_observation().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn header_only_input_signals_end_of_data() {
        let mut reader = CsvReader::open(&b"the,header,row\n"[..]).await.unwrap();
        assert!(reader.next_observation().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn crlf_line_endings_are_stripped() {
        let mut reader = CsvReader::open(&b"header\r\nA,B\r\nC,D\r\n"[..]).await.unwrap();

        let first = reader.next_observation().await.unwrap().unwrap();
        assert_eq!(first.row, "A,B");
        let second = reader.next_observation().await.unwrap().unwrap();
        assert_eq!(second.row, "C,D");
        assert!(reader.next_observation().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_failures_are_surfaced_as_errors() {
        use futures::stream;
        use tokio_util::io::StreamReader;

        let chunks: Vec<Result<&[u8], io::Error>> = vec![
            Ok(b"header\nA,B\n"),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "stream cut")),
        ];
        let source = StreamReader::new(stream::iter(chunks));
        let mut reader = CsvReader::open(source).await.unwrap();

        assert_eq!(reader.next_observation().await.unwrap().unwrap().row, "A,B");
        let err = reader.next_observation().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
