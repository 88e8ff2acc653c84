// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::Result;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use scraper::Html;
use url::Url;

use crate::moodle::selectors::{FRAMES, REGION_CONTENT_LINK};
use crate::moodle::Moodle;
use crate::util::file_escape;

/// Resolves a resource link to a downloadable URL and a sanitized file name.
///
/// Three response shapes are understood: a direct file (attachment header),
/// a preview page whose main content region links to the file, and a legacy
/// frameset page whose second frame shows the file. Malformed pages resolve
/// to `None` and are skipped; a non-success status is an error.
pub async fn resolve(moodle: &Moodle, href: &str) -> Result<Option<(String, String)>> {
	let resp = moodle.get(href).await?;
	if let Some(disposition) = resp.headers().get(CONTENT_DISPOSITION) {
		// direct file link
		let name = match disposition.to_str().ok().and_then(disposition_filename) {
			Some(name) => name,
			None => {
				warning!(format => "unreadable attachment header on {}, using the URL file name", href);
				basename(href)
			},
		};
		return Ok(Some((href.to_owned(), escaped_name(&name))));
	}
	// got a preview page
	let headers = resp.headers().clone();
	let text = resp.text().await?;
	let html = Html::parse_document(&text);
	let src = if is_plain_website(&headers) {
		// an ordinary page displaying a download link
		match html.select(&REGION_CONTENT_LINK).next().and_then(|a| a.value().attr("href")) {
			Some(src) => src.to_owned(),
			None => {
				warning!(format => "preview page {} has no download link, skipping", href);
				return Ok(None);
			},
		}
	} else {
		// a legacy frameset page, the second frame shows the file
		match html.select(&FRAMES).nth(1).and_then(|frame| frame.value().attr("src")) {
			Some(src) => src.to_owned(),
			None => {
				warning!(format => "frameset page {} has fewer than two frames, skipping", href);
				return Ok(None);
			},
		}
	};
	let name = basename(&src);
	Ok(Some((src, escaped_name(&name))))
}

/// Preview pages of ordinary resources carry this trio of headers, frameset
/// pages do not.
fn is_plain_website(headers: &HeaderMap) -> bool {
	headers.contains_key(CONTENT_TYPE) && headers.contains_key("content-script-type") && headers.contains_key("content-style-type")
}

fn disposition_filename(value: &str) -> Option<String> {
	for part in value.split(';').skip(1) {
		let mut pair = part.splitn(2, '=');
		let key = pair.next()?.trim();
		if key.eq_ignore_ascii_case("filename") {
			return Some(pair.next()?.trim().trim_matches('"').to_owned());
		}
	}
	None
}

/// The final path segment of a URL, without query or fragment.
fn basename(href: &str) -> String {
	match Url::parse(href) {
		Ok(url) => url
			.path_segments()
			.and_then(|segments| segments.last())
			.unwrap_or_default()
			.to_owned(),
		Err(_) => {
			let path = href.split(|c| c == '?' || c == '#').next().unwrap_or(href);
			path.rsplit('/').next().unwrap_or(path).to_owned()
		},
	}
}

fn escaped_name(name: &str) -> String {
	let escaped = file_escape(name);
	if escaped.is_empty() {
		"unnamed".to_owned()
	} else {
		escaped
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::moodle::test_session;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	#[test]
	fn filename_is_extracted_from_attachment_header() {
		assert_eq!(
			disposition_filename(r#"attachment; filename="report.pdf""#),
			Some("report.pdf".to_owned())
		);
		assert_eq!(disposition_filename("attachment; filename=plain.txt"), Some("plain.txt".to_owned()));
		assert_eq!(disposition_filename("inline"), None);
	}

	#[test]
	fn basename_drops_query_and_fragment() {
		assert_eq!(basename("https://host/a/b/file.zip?forcedownload=1"), "file.zip");
		assert_eq!(basename("mod/resource/content/notes.pdf#page=2"), "notes.pdf");
	}

	#[tokio::test]
	async fn direct_file_resolves_to_the_original_link() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/mod/resource/view.php"))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header("Content-Disposition", r#"attachment; filename="report.pdf""#)
					.set_body_bytes(&b"%PDF-1.4"[..]),
			)
			.mount(&server)
			.await;
		let moodle = test_session(&server.uri()).await;
		let resolved = resolve(&moodle, "mod/resource/view.php").await.unwrap();
		assert_eq!(resolved, Some(("mod/resource/view.php".to_owned(), "report.pdf".to_owned())));
	}

	#[tokio::test]
	async fn preview_page_resolves_to_the_main_content_link() {
		let server = MockServer::start().await;
		let body = concat!(
			r#"<div class="navbar"><a href="index.php">home</a></div>"#,
			r#"<div class="region-content"><a href="https://host/file.zip">file.zip</a></div>"#
		);
		Mock::given(method("GET"))
			.and(path("/mod/resource/view.php"))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header("Content-Type", "text/html")
					.insert_header("Content-Script-Type", "text/javascript")
					.insert_header("Content-Style-Type", "text/css")
					.set_body_string(body),
			)
			.mount(&server)
			.await;
		let moodle = test_session(&server.uri()).await;
		let resolved = resolve(&moodle, "mod/resource/view.php").await.unwrap();
		assert_eq!(resolved, Some(("https://host/file.zip".to_owned(), "file.zip".to_owned())));
	}

	#[tokio::test]
	async fn frameset_page_resolves_to_the_second_frame() {
		let server = MockServer::start().await;
		let body = concat!(
			r#"<frameset rows="30,*">"#,
			r#"<frame src="toolbar.php">"#,
			r#"<frame src="pluginfile.php/9/notes%20week1.pdf">"#,
			r#"</frameset>"#
		);
		Mock::given(method("GET"))
			.and(path("/mod/resource/view.php"))
			.respond_with(ResponseTemplate::new(200).set_body_string(body))
			.mount(&server)
			.await;
		let moodle = test_session(&server.uri()).await;
		let resolved = resolve(&moodle, "mod/resource/view.php").await.unwrap();
		assert_eq!(
			resolved,
			Some(("pluginfile.php/9/notes%20week1.pdf".to_owned(), "notes week1.pdf".to_owned()))
		);
	}

	#[tokio::test]
	async fn frameset_page_with_one_frame_is_skipped() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/mod/resource/view.php"))
			.respond_with(ResponseTemplate::new(200).set_body_string(r#"<frameset><frame src="only.php"></frameset>"#))
			.mount(&server)
			.await;
		let moodle = test_session(&server.uri()).await;
		let resolved = resolve(&moodle, "mod/resource/view.php").await.unwrap();
		assert_eq!(resolved, None);
	}

	#[tokio::test]
	async fn error_status_is_fatal() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/mod/resource/view.php"))
			.respond_with(ResponseTemplate::new(403))
			.mount(&server)
			.await;
		let moodle = test_session(&server.uri()).await;
		assert!(resolve(&moodle, "mod/resource/view.php").await.is_err());
	}
}
