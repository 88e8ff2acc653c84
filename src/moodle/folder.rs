// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;

use anyhow::Result;

use crate::moodle::selectors::{FOLDER_ENTRIES, FOLDER_FILE_NAME, LINKS};
use crate::moodle::{file, Moodle, Totals};
use crate::util::{create_dir, file_escape, prune_empty_dir};

/// Materializes a folder activity: fetches its landing page and saves every
/// listed file into a subdirectory named after the folder, in the order the
/// files appear on the page. Nested folders are shown flat by the platform,
/// there is nothing to recurse into.
pub async fn download(moodle: &Moodle, name: &str, href: &str, parent: &Path) -> Result<Totals> {
	let mut totals = Totals::default();
	let escaped = file_escape(name);
	let escaped = if escaped.is_empty() { "unnamed".to_owned() } else { escaped };
	let dir = parent.join(&escaped);
	create_dir(&dir).await?;
	log!(0, "       |  +--{}", escaped.bold());
	let entries = {
		let html = moodle.get_html(href).await?;
		let mut entries = Vec::new();
		for entry in html.select(&FOLDER_ENTRIES) {
			let link = entry.select(&LINKS).next().and_then(|a| a.value().attr("href"));
			let file_name = entry
				.select(&FOLDER_FILE_NAME)
				.next()
				.map(|el| el.text().collect::<String>());
			match (link, file_name) {
				(Some(link), Some(file_name)) => {
					let file_name = file_escape(file_name.trim());
					let file_name = if file_name.is_empty() { "unnamed".to_owned() } else { file_name };
					entries.push((link.to_owned(), file_name));
				},
				_ => log!(1, "Ignored folder entry without link"),
			}
		}
		entries
	};
	for (href, name) in entries {
		match file::save_file(moodle, &href, &dir, &name).await {
			Ok(status) => totals.record(status),
			Err(e) => error!("couldn't save file {}", name; e),
		}
	}
	prune_empty_dir(&dir).await?;
	Ok(totals)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::moodle::test_session;
	use tokio::fs;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	#[tokio::test]
	async fn folder_files_are_saved_into_a_subdirectory() {
		let server = MockServer::start().await;
		let listing = concat!(
			r#"<span class="fp-filename-icon"><a href="pluginfile.php/3/sheet1.pdf">"#,
			r#"<span class="fp-filename">sheet 1.pdf</span></a></span>"#,
			r#"<span class="fp-filename-icon"><a href="pluginfile.php/3/solution.pdf">"#,
			r#"<span class="fp-filename">solution.pdf</span></a></span>"#,
			r#"<span class="fp-filename-icon"><span class="fp-filename">orphan</span></span>"#
		);
		Mock::given(method("GET"))
			.and(path("/mod/folder/view.php"))
			.respond_with(ResponseTemplate::new(200).set_body_string(listing))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/pluginfile.php/3/sheet1.pdf"))
			.respond_with(ResponseTemplate::new(200).set_body_bytes(&b"sheet"[..]))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/pluginfile.php/3/solution.pdf"))
			.respond_with(ResponseTemplate::new(200).set_body_bytes(&b"solution"[..]))
			.mount(&server)
			.await;
		let moodle = test_session(&server.uri()).await;
		let tmp = tempfile::tempdir().unwrap();

		let totals = download(&moodle, "Exercise Sheets", "mod/folder/view.php", tmp.path()).await.unwrap();

		assert_eq!(totals.saved, 2);
		let dir = tmp.path().join("Exercise Sheets");
		assert_eq!(fs::read(dir.join("sheet 1.pdf")).await.unwrap(), b"sheet");
		assert_eq!(fs::read(dir.join("solution.pdf")).await.unwrap(), b"solution");
	}

	#[tokio::test]
	async fn empty_folder_directory_is_pruned() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/mod/folder/view.php"))
			.respond_with(ResponseTemplate::new(200).set_body_string("<div>no files</div>"))
			.mount(&server)
			.await;
		let moodle = test_session(&server.uri()).await;
		let tmp = tempfile::tempdir().unwrap();

		let totals = download(&moodle, "Empty", "mod/folder/view.php", tmp.path()).await.unwrap();

		assert_eq!(totals.files(), 0);
		assert!(fs::metadata(tmp.path().join("Empty")).await.is_err());
	}
}
