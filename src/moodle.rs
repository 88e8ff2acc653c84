// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, bail, ensure, Context, Result};
use cookie_store::CookieStore;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Proxy};
use reqwest_cookie_store::CookieStoreMutex;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use url::Url;

use crate::cli::Opt;
use crate::moodle::file::SaveStatus;

pub mod course;
pub mod file;
pub mod folder;
pub mod resource;
pub mod section;

pub mod selectors {
	use once_cell::sync::Lazy;
	use scraper::Selector;
	// construct CSS selectors once
	pub static LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
	pub static H2: Lazy<Selector> = Lazy::new(|| Selector::parse("h2").unwrap());
	pub static H3: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").unwrap());
	pub static LOGIN_TOKEN: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"input[name="logintoken"]"#).unwrap());
	pub static SECTIONS: Lazy<Selector> = Lazy::new(|| Selector::parse(".section.main.clearfix").unwrap());
	pub static SECTION_CONTENT: Lazy<Selector> = Lazy::new(|| Selector::parse(".content").unwrap());
	pub static SECTION_NAME: Lazy<Selector> = Lazy::new(|| Selector::parse(".sectionname").unwrap());
	pub static SECTION_SUMMARY: Lazy<Selector> = Lazy::new(|| Selector::parse(".summary").unwrap());
	pub static ACTIVITIES: Lazy<Selector> = Lazy::new(|| Selector::parse(".activity").unwrap());
	pub static INSTANCE_NAME: Lazy<Selector> = Lazy::new(|| Selector::parse("span.instancename").unwrap());
	pub static REGION_CONTENT_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse(".region-content a").unwrap());
	pub static FRAMES: Lazy<Selector> = Lazy::new(|| Selector::parse("frame").unwrap());
	pub static FOLDER_ENTRIES: Lazy<Selector> = Lazy::new(|| Selector::parse("span.fp-filename-icon").unwrap());
	pub static FOLDER_FILE_NAME: Lazy<Selector> = Lazy::new(|| Selector::parse("span.fp-filename").unwrap());
}

use selectors::*;

static CATBOX_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"catbox(\d+)").unwrap());

pub struct Moodle {
	pub opt: Opt,
	pub base: Url,
	client: Client,
	cookies: Arc<CookieStoreMutex>,
}

impl Moodle {
	fn with_client(opt: Opt, cookies: Arc<CookieStoreMutex>) -> Result<Self> {
		let mut url = opt.url.clone();
		if !url.ends_with('/') {
			url.push('/');
		}
		let base = Url::parse(&url).context("invalid Moodle base URL")?;
		let mut builder = Client::builder()
			.cookie_provider(Arc::clone(&cookies))
			.user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));
		if let Some(proxy) = opt.proxy.as_ref() {
			let proxy = Proxy::all(proxy)?;
			builder = builder.proxy(proxy);
		}
		// timeout is infinite by default
		let client = builder.build()?;
		Ok(Moodle { opt, base, client, cookies })
	}

	pub async fn with_session(opt: Opt, session: Arc<CookieStoreMutex>) -> Result<Self> {
		let this = Moodle::with_client(opt, session)?;
		info!("Re-using previous session cookies..");
		Ok(this)
	}

	pub async fn login(opt: Opt, user: &str, pass: &str) -> Result<Self> {
		let cookie_store = CookieStore::default();
		let cookie_store = CookieStoreMutex::new(cookie_store);
		let cookie_store = Arc::new(cookie_store);
		let this = Moodle::with_client(opt, cookie_store)?;
		info!("Logging into Moodle..");
		let login_url = this.base.join("login/index.php")?;
		let login_page = this.client.get(login_url.clone()).send().await?.text().await?;
		let token = {
			let dom = Html::parse_document(&login_page);
			dom.select(&LOGIN_TOKEN)
				.next()
				.and_then(|input| input.value().attr("value"))
				.context("couldn't find login token (did the login page change?)")?
				.to_owned()
		};
		this.client
			.post(login_url)
			.form(&json!({
				"logintoken": token,
				"username": user,
				"password": pass,
			}))
			.send()
			.await?;
		success!("Logged in!");
		Ok(this)
	}

	pub async fn save_session(&self) -> Result<()> {
		let session_path = self.opt.output.join(".moodlesession");
		let mut writer = std::fs::File::create(session_path).map(std::io::BufWriter::new)?;
		let store = self.cookies.lock().map_err(|x| anyhow!("{}", x))?;
		// save all cookies, including session cookies
		for cookie in store.iter_unexpired().map(serde_json::to_string) {
			writeln!(writer, "{}", cookie?)?;
		}
		writer.flush()?;
		Ok(())
	}

	/// Issues a GET request. The href may be relative to the base URL.
	pub async fn download(&self, href: &str) -> Result<reqwest::Response> {
		log!(2, "Downloading {}", href);
		let url = self.base.join(href).context("invalid URL")?;
		Ok(self.client.get(url).send().await?)
	}

	/// Like [`Moodle::download`], but a non-success status is an error.
	pub async fn get(&self, href: &str) -> Result<reqwest::Response> {
		let resp = self.download(href).await?;
		let status = resp.status();
		if !status.is_success() {
			bail!("{} {} (GET {})", status.as_str(), status.canonical_reason().unwrap_or("unknown status"), href);
		}
		Ok(resp)
	}

	pub async fn get_html(&self, href: &str) -> Result<Html> {
		let text = self.get(href).await?.text().await?;
		Ok(Html::parse_document(&text))
	}

	/// Lists the semesters shown on the personal overview page.
	pub async fn semesters(&self) -> Result<BTreeMap<String, String>> {
		let text = self.get("my/").await?.text().await?;
		let html = Html::parse_document(&text);
		let mut semesters = BTreeMap::new();
		for captures in CATBOX_REGEX.captures_iter(&text) {
			let id = &captures[1];
			if semesters.contains_key(id) {
				continue;
			}
			let header = match semester_header(&html, id) {
				Some(header) => header,
				None => {
					warning!(format => "semester {} has no heading, skipping", id);
					continue;
				},
			};
			let name = header.text().collect::<String>();
			// trim the "click to show" hint after " - "
			let name = name.split(" - ").next().unwrap_or(&name).trim().to_owned();
			semesters.insert(id.to_owned(), name);
		}
		ensure!(!semesters.is_empty(), "no semesters found (did the overview page change?)");
		Ok(semesters)
	}

	/// Lists the courses of one semester.
	pub async fn courses(&self, semester_id: &str) -> Result<Vec<Course>> {
		let href = format!("blocks/course_overview/partial.php?categories={}", semester_id);
		let text = self.get(&href).await?.text().await?;
		let html = Html::parse_document(&text);
		let mut courses = Vec::new();
		for header in html.select(&H2) {
			if let Some(link) = header.select(&LINKS).next() {
				let href = match link.value().attr("href") {
					Some(href) => href,
					None => continue,
				};
				let label = link.text().collect::<String>();
				courses.push(Course::parse(label.trim(), href));
			}
		}
		ensure!(!courses.is_empty(), "no courses found in this semester");
		Ok(courses)
	}
}

/// The heading belonging to a semester container, either nested inside it or
/// a following sibling of it.
fn semester_header<'a>(html: &'a Html, id: &str) -> Option<ElementRef<'a>> {
	let selector = Selector::parse(&format!("#catbox{}", id)).ok()?;
	let catbox = html.select(&selector).next()?;
	catbox.select(&H3).next().or_else(|| {
		catbox
			.next_siblings()
			.filter_map(ElementRef::wrap)
			.find(|el| el.value().name() == "h3")
	})
}

pub const SEMESTER_UNSPECIFIED: &str = "unspecified";

/// One enrolled course, parsed from its comma-delimited overview label.
#[derive(Debug, Clone)]
pub struct Course {
	pub key: String,
	pub course_code: String,
	pub semester_tag: String,
	pub name: String,
	pub url: String,
}

impl Course {
	/// Parses a label of the form `code.tag.key, name, ...`. Labels with
	/// fewer parts fall back to the whole label as key and name.
	pub fn parse(label: &str, href: &str) -> Self {
		let parts = label.split(',').collect::<Vec<_>>();
		if parts.len() >= 3 {
			let head = parts[0].split('.').collect::<Vec<_>>();
			if head.len() >= 3 {
				return Course {
					course_code: head[0].trim().to_owned(),
					semester_tag: head[1].trim().to_owned(),
					key: head[2].trim().to_owned(),
					name: parts[1].trim().to_owned(),
					url: href.to_owned(),
				};
			}
		}
		let label = label.trim().to_owned();
		Course {
			key: label.clone(),
			course_code: label.clone(),
			semester_tag: SEMESTER_UNSPECIFIED.to_owned(),
			name: label,
			url: href.to_owned(),
		}
	}
}

/// Per-course accumulator for end-of-run reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Totals {
	pub saved: usize,
	pub skipped: usize,
	pub sections: usize,
}

impl Totals {
	pub fn record(&mut self, status: SaveStatus) {
		match status {
			SaveStatus::Saved => self.saved += 1,
			SaveStatus::Skipped => self.skipped += 1,
		}
	}

	pub fn merge(&mut self, other: Totals) {
		self.saved += other.saved;
		self.skipped += other.skipped;
		self.sections += other.sections;
	}

	pub fn files(&self) -> usize {
		self.saved + self.skipped
	}
}

#[cfg(test)]
pub(crate) async fn test_session(base: &str) -> Moodle {
	let opt = Opt {
		url: base.to_owned(),
		output: std::env::temp_dir(),
		verbose: 0,
		proxy: None,
		username: None,
		password: None,
		keep_session: false,
	};
	let cookies = Arc::new(CookieStoreMutex::new(CookieStore::default()));
	Moodle::with_session(opt, cookies).await.unwrap()
}
