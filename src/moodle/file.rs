// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;

use anyhow::Result;
use tokio::fs;

use crate::moodle::Moodle;
use crate::util::{write_file_data, write_stream_to_file};

pub const INFO_FILE: &str = "info.txt";

/// Marker found in descriptions that only announce the course forums.
const FORUM_PLACEHOLDER: &str = "Foren";

/// Whether a destination was written or already present. Skipping is the
/// expected idempotence mechanism, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
	Saved,
	Skipped,
}

/// Downloads `href` into `dir/name` unless a file of that name exists.
pub async fn save_file(moodle: &Moodle, href: &str, dir: &Path, name: &str) -> Result<SaveStatus> {
	let dst = dir.join(name);
	if fs::metadata(&dst).await.is_ok() {
		log!(0, "[{}] |  |  +--{}", "skip".bright_blue(), name);
		return Ok(SaveStatus::Skipped);
	}
	log!(0, "[{}] |  |  +--{}", "save".bright_green(), name);
	let resp = moodle.download(href).await?;
	write_stream_to_file(&dst, resp.bytes_stream()).await?;
	Ok(SaveStatus::Saved)
}

/// Writes literal text to `path` unless that file exists.
pub async fn save_text(path: &Path, text: &str) -> Result<SaveStatus> {
	let name = path.file_name().map(|x| x.to_string_lossy().into_owned()).unwrap_or_default();
	if fs::metadata(path).await.is_ok() {
		log!(0, "[{}] +--{}", "skip".bright_blue(), name);
		return Ok(SaveStatus::Skipped);
	}
	log!(0, "[{}] +--{}", "save".bright_green(), name);
	write_file_data(path, &mut text.as_bytes()).await?;
	Ok(SaveStatus::Saved)
}

/// Writes a section or folder description to `info.txt` inside `dir`.
/// Forum placeholder blurbs are not saved at all.
pub async fn save_info(dir: &Path, info: &str) -> Result<Option<SaveStatus>> {
	if info.contains(FORUM_PLACEHOLDER) {
		return Ok(None);
	}
	Ok(Some(save_text(&dir.join(INFO_FILE), info).await?))
}
