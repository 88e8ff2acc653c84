// SPDX-License-Identifier: GPL-3.0-or-later

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use percent_encoding::percent_decode_str;
use tokio::fs;
use tokio::fs::File as AsyncFile;
use tokio::io::{AsyncRead, BufWriter};
use tokio_util::io::StreamReader;

/// Escapes a display name for use as a single path segment.
///
/// Colons are replaced by dashes, double quotes are dropped and slashes are
/// replaced by dashes. Percent-encoded fragments left over from URL paths
/// are decoded afterwards. May return an empty string, callers have to
/// supply a fallback name in that case.
pub fn file_escape(name: &str) -> String {
	let name = name.replace(':', "-").replace('"', "").replace('/', "-");
	percent_decode_str(&name).decode_utf8_lossy().into_owned()
}

pub async fn create_dir(path: &Path) -> Result<()> {
	if fs::metadata(path).await.is_err() {
		fs::create_dir_all(path).await.context("failed to create directory")?;
	}
	Ok(())
}

/// Removes the directory if it contains no entries at all.
pub async fn prune_empty_dir(path: &Path) -> Result<()> {
	let mut entries = fs::read_dir(path).await.context("failed to inspect directory")?;
	if entries.next_entry().await?.is_none() {
		fs::remove_dir(path).await.context("failed to remove empty directory")?;
	}
	Ok(())
}

pub async fn write_file_data<R: ?Sized>(path: impl AsRef<Path>, data: &mut R) -> Result<()>
where
	R: AsyncRead + Unpin,
{
	let file = AsyncFile::create(path.as_ref()).await.context("failed to create file")?;
	let mut file = BufWriter::new(file);
	tokio::io::copy(data, &mut file).await.context("failed to write to file")?;
	Ok(())
}

/// Streams a response body to disk in chunks to bound memory usage.
pub async fn write_stream_to_file(
	path: &Path,
	stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
) -> Result<()> {
	let mut reader = StreamReader::new(stream.map_err(|x| io::Error::new(io::ErrorKind::Other, x)));
	write_file_data(path, &mut reader).await
}
