use crate::sources::error::SourceError;
use async_compression::tokio::bufread::GzipDecoder;
use futures_util::TryStreamExt;
use log::{info, warn};
use polars::frame::DataFrame;
use polars::prelude::*;
use reqwest::Client;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufRead, AsyncReadExt};
use tokio::{fs, task};
use tokio_util::io::StreamReader;

/// Cached payloads at or below this size are treated as failed downloads and fetched again.
const MIN_CACHE_BYTES: u64 = 1000;

/// How raw CSV bytes are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvLayout {
    /// Comma separated with a header row. Every column is read as a string.
    Sheet,
    /// Headerless tab separated export with no quoting and possibly non-UTF-8 bytes.
    /// Polars names the columns `column_1`, `column_2`, ...
    Tsv,
}

/// Downloads remote files into a cache directory and parses them into frames.
pub struct SourceLoader {
    cache_dir: PathBuf,
    download_client: Client,
}

impl SourceLoader {
    pub fn new(cache_dir: &Path) -> SourceLoader {
        SourceLoader {
            cache_dir: cache_dir.to_path_buf(),
            download_client: Client::new(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the body at `url`, served from `cache_dir/cache_name` when a usable copy exists.
    pub async fn fetch_bytes(&self, url: &str, cache_name: &str) -> Result<Vec<u8>, SourceError> {
        let cache_path = self.cache_dir.join(cache_name);

        if let Ok(metadata) = fs::metadata(&cache_path).await {
            if metadata.len() > MIN_CACHE_BYTES {
                info!("Cache hit for {} at {:?}", url, cache_path);
                return fs::read(&cache_path)
                    .await
                    .map_err(|e| SourceError::CacheRead(cache_path.clone(), e));
            }
        }
        warn!("Cache miss for {}. Downloading.", url);

        let bytes = self.download(url).await?;

        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| SourceError::CacheDirCreation(self.cache_dir.clone(), e))?;
        fs::write(&cache_path, &bytes)
            .await
            .map_err(|e| SourceError::CacheWrite(cache_path.clone(), e))?;
        info!("Cached {} bytes from {} to {:?}", bytes.len(), url, cache_path);
        Ok(bytes)
    }

    /// Fetches a spreadsheet export and parses it with [`CsvLayout::Sheet`].
    pub async fn fetch_sheet(&self, url: &str, cache_name: &str) -> Result<DataFrame, SourceError> {
        let bytes = self.fetch_bytes(url, cache_name).await?;
        csv_to_dataframe(bytes, cache_name, CsvLayout::Sheet).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        info!("Downloading data from {}", url);

        let response = self
            .download_client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::NetworkRequest(url.to_string(), e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("HTTP error for {}: {:?}", url, e);
                return Err(if let Some(status) = e.status() {
                    SourceError::HttpStatus {
                        url: url.to_string(),
                        status,
                        source: e,
                    }
                } else {
                    SourceError::NetworkRequest(url.to_string(), e)
                });
            }
        };

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let body = read_body(StreamReader::new(stream), url.ends_with(".gz")).await?;
        info!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

/// Drains `reader`, gunzipping on the fly when `gzipped` is set.
pub(crate) async fn read_body<R>(reader: R, gzipped: bool) -> std::io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    if gzipped {
        GzipDecoder::new(reader).read_to_end(&mut body).await?;
    } else {
        let mut reader = reader;
        reader.read_to_end(&mut body).await?;
    }
    Ok(body)
}

/// Parses raw CSV bytes on a blocking thread.
pub(crate) async fn csv_to_dataframe(
    bytes: Vec<u8>,
    source_name: &str,
    layout: CsvLayout,
) -> Result<DataFrame, SourceError> {
    let source_name = source_name.to_string();

    task::spawn_blocking(move || {
        let io_err = |source: std::io::Error| SourceError::CsvReadIo {
            source_name: source_name.clone(),
            source,
        };
        let polars_err = |source: PolarsError| SourceError::CsvReadPolars {
            source_name: source_name.clone(),
            source,
        };

        let mut temp_file = NamedTempFile::new().map_err(io_err)?;
        temp_file.write_all(&bytes).map_err(io_err)?;
        temp_file.flush().map_err(io_err)?;

        let options = match layout {
            CsvLayout::Sheet => CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(0)),
            CsvLayout::Tsv => CsvReadOptions::default()
                .with_has_header(false)
                .with_infer_schema_length(Some(0))
                .map_parse_options(|opts| {
                    opts.with_separator(b'\t')
                        .with_quote_char(None)
                        .with_encoding(CsvEncoding::LossyUtf8)
                        .with_truncate_ragged_lines(true)
                }),
        };

        options
            .try_into_reader_with_file_path(Some(temp_file.path().to_path_buf()))
            .map_err(polars_err)?
            .finish()
            .map_err(polars_err)
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::bufread::GzipEncoder;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_body_plain_and_gzipped() -> Result<(), Box<dyn std::error::Error>> {
        let payload = b"Nationality,Jan 2020\nMexico,\"1,234\"\n".to_vec();

        let plain = read_body(Cursor::new(payload.clone()), false).await?;
        assert_eq!(plain, payload);

        let mut compressed = Vec::new();
        GzipEncoder::new(Cursor::new(payload.clone()))
            .read_to_end(&mut compressed)
            .await?;
        assert_ne!(compressed, payload);
        let inflated = read_body(Cursor::new(compressed), true).await?;
        assert_eq!(inflated, payload);
        Ok(())
    }

    #[tokio::test]
    async fn test_sheet_layout_reads_everything_as_strings() -> Result<(), Box<dyn std::error::Error>> {
        let csv = b"Nationality,Jan 2020,Feb 2020\nMexico,\"1,234\",7\nGuatemala,5,\n".to_vec();
        let df = csv_to_dataframe(csv, "sheet", CsvLayout::Sheet).await?;
        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.column("Feb 2020")?.dtype(), &DataType::String);
        assert_eq!(df.column("Jan 2020")?.str()?.get(0), Some("1,234"));
        Ok(())
    }

    #[tokio::test]
    async fn test_tsv_layout_uses_positional_names() -> Result<(), Box<dyn std::error::Error>> {
        let tsv = b"1\t20240101\tsome \"quoted\ttext\n2\t20240102\tx\ty\n".to_vec();
        let df = csv_to_dataframe(tsv, "events", CsvLayout::Tsv).await?;
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("column_2")?.str()?.get(1), Some("20240102"));
        assert_eq!(df.column("column_3")?.str()?.get(0), Some("some \"quoted"));
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_bytes_serves_cached_copy() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let cached = vec![b'x'; 2048];
        std::fs::write(dir.path().join("sheet.csv"), &cached)?;

        let loader = SourceLoader::new(dir.path());
        // The URL is never contacted because the cached file is large enough.
        let bytes = loader
            .fetch_bytes("http://127.0.0.1:9/unreachable.csv", "sheet.csv")
            .await?;
        assert_eq!(bytes, cached);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_bytes_unreachable_host_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("tiny.csv"), b"too small")?;
        let loader = SourceLoader::new(dir.path());
        let result = loader
            .fetch_bytes("http://127.0.0.1:9/unreachable.csv", "tiny.csv")
            .await;
        assert!(matches!(result, Err(SourceError::NetworkRequest(..))));
        Ok(())
    }
}
