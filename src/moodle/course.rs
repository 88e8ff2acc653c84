// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;

use anyhow::{Context, Result};
use scraper::Html;

use crate::moodle::section::{self, Section};
use crate::moodle::selectors::SECTIONS;
use crate::moodle::{Course, Moodle, Totals};
use crate::util::{create_dir, file_escape, write_file_data};

/// Mirrors one course below `root/<semester>/<courseKey>/`.
///
/// The raw course page is archived in a hidden `.dump` directory first, one
/// snapshot per calendar date. Repeated runs on the same day overwrite it.
pub async fn download(moodle: &Moodle, course: &Course, semester: &str, root: &Path) -> Result<Totals> {
	let key = file_escape(&course.key);
	let path = root.join(file_escape(semester)).join(&key);
	create_dir(&path).await.context("failed to create course directory")?;
	log!(0, "       +--{}", key.bold());
	let text = moodle.get(&course.url).await?.text().await?;

	let dump_dir = path.join(".dump");
	create_dir(&dump_dir).await?;
	let dump_name = file_escape(&format!("{}-{}-full.html", course.key, chrono::Local::now().format("%Y-%m-%d")));
	write_file_data(dump_dir.join(dump_name), &mut text.as_bytes())
		.await
		.context("failed to write course page snapshot")?;

	let sections = {
		let html = Html::parse_document(&text);
		html.select(&SECTIONS).map(Section::parse).collect::<Result<Vec<_>>>()?
	};
	let mut totals = Totals::default();
	for section in &sections {
		totals.merge(section::download(moodle, section, &path).await?);
	}
	Ok(totals)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::moodle::test_session;
	use tokio::fs;
	use wiremock::matchers::{method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn test_course(href: &str) -> Course {
		Course {
			key: "INF-101".to_owned(),
			course_code: "M".to_owned(),
			semester_tag: "WS2021".to_owned(),
			name: "Introduction".to_owned(),
			url: href.to_owned(),
		}
	}

	#[tokio::test]
	async fn course_download_is_idempotent() {
		let server = MockServer::start().await;
		let page = concat!(
			r#"<ul class="topics">"#,
			r#"<li id="section-0" class="section main clearfix"><div class="content"><ul>"#,
			r#"<li class="activity label modtype_label">Welcome to the course!</li>"#,
			r#"</ul></div></li>"#,
			r#"<li id="section-1" class="section main clearfix"><div class="content">"#,
			r#"<h3 class="sectionname">Week 1</h3>"#,
			r#"<div class="summary"></div><ul>"#,
			r#"<li class="activity resource modtype_resource"><a href="mod/resource/view.php?id=5">"#,
			r#"<span class="instancename">Slides</span></a></li>"#,
			r#"</ul></div></li>"#,
			r#"</ul>"#
		);
		Mock::given(method("GET"))
			.and(path("/course/view.php"))
			.and(query_param("id", "1"))
			.respond_with(ResponseTemplate::new(200).set_body_string(page))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/mod/resource/view.php"))
			.and(query_param("id", "5"))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header("Content-Disposition", r#"attachment; filename="slides.pdf""#)
					.set_body_bytes(&b"%PDF-1.4"[..]),
			)
			.mount(&server)
			.await;
		let moodle = test_session(&server.uri()).await;
		let course = test_course("course/view.php?id=1");
		let tmp = tempfile::tempdir().unwrap();

		let first = download(&moodle, &course, "WS 2020/21", tmp.path()).await.unwrap();
		assert_eq!(first.saved, 2); // info.txt + slides.pdf
		assert_eq!(first.skipped, 0);
		assert_eq!(first.sections, 1);

		let root = tmp.path().join("WS 2020-21").join("INF-101");
		let dump = root.join(".dump").join(format!("INF-101-{}-full.html", chrono::Local::now().format("%Y-%m-%d")));
		assert!(fs::metadata(&dump).await.unwrap().is_file());
		assert_eq!(fs::read_to_string(root.join("info.txt")).await.unwrap(), "Welcome to the course!");
		assert_eq!(fs::read(root.join("Week 1").join("slides.pdf")).await.unwrap(), b"%PDF-1.4");

		let second = download(&moodle, &course, "WS 2020/21", tmp.path()).await.unwrap();
		assert_eq!(second.saved, 0);
		assert_eq!(second.skipped, 2);
		assert_eq!(second.sections, 1);
	}

	#[tokio::test]
	async fn error_status_on_the_course_page_is_fatal() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/course/view.php"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&server)
			.await;
		let moodle = test_session(&server.uri()).await;
		let course = test_course("course/view.php?id=1");
		let tmp = tempfile::tempdir().unwrap();
		assert!(download(&moodle, &course, "WS 2020/21", tmp.path()).await.is_err());
	}
}
