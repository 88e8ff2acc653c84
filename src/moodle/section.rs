// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use scraper::ElementRef;
use tokio::fs;

use crate::moodle::selectors::{ACTIVITIES, INSTANCE_NAME, LINKS, SECTION_CONTENT, SECTION_NAME, SECTION_SUMMARY};
use crate::moodle::{file, folder, resource, Moodle, Totals};
use crate::util::{file_escape, prune_empty_dir};

/// One activity node inside a section, classified by its module type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
	Label { text: String },
	Resource { href: String },
	Folder { name: String, href: String },
	Unknown { kind: String },
}

/// One top-level section of a course page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
	/// The unnamed leading section (`section-0`). Its files land next to
	/// the course page itself, no extra directory is created.
	General {
		description: Option<String>,
		activities: Vec<Activity>,
	},
	Named {
		name: String,
		description: String,
		activities: Vec<Activity>,
	},
}

impl Section {
	/// Classifies one top-level section container in a single pass.
	pub fn parse(section: ElementRef) -> Result<Section> {
		let activities = classify_activities(section);
		if section.value().attr("id") == Some("section-0") {
			let description = activities.iter().find_map(|activity| match activity {
				Activity::Label { text } => Some(text.clone()),
				_ => None,
			});
			return Ok(Section::General { description, activities });
		}
		let content = section.select(&SECTION_CONTENT).next().context("section without content block")?;
		let name = content
			.select(&SECTION_NAME)
			.next()
			.context("section without name")?
			.text()
			.collect::<String>();
		let summary = content
			.select(&SECTION_SUMMARY)
			.next()
			.map(|el| el.text().collect::<String>().trim().to_owned())
			.unwrap_or_default();
		let (name, description) = derive_title(name.trim().to_owned(), summary);
		Ok(Section::Named {
			name,
			description,
			activities,
		})
	}

	pub fn activities(&self) -> &[Activity] {
		match self {
			Section::General { activities, .. } | Section::Named { activities, .. } => activities,
		}
	}
}

fn classify_activities(section: ElementRef) -> Vec<Activity> {
	let mut activities = Vec::new();
	for node in section.select(&ACTIVITIES) {
		let classes = node.value().attr("class").unwrap_or_default();
		let activity = if classes.contains("modtype_resource") {
			match first_href(node) {
				Some(href) => Activity::Resource { href },
				// not a real resource, malformed markup
				None => Activity::Unknown {
					kind: "resource without link".to_owned(),
				},
			}
		} else if classes.contains("modtype_folder") {
			let name = node.select(&INSTANCE_NAME).next().map(|el| el.text().collect::<String>());
			match (name, first_href(node)) {
				(Some(name), Some(href)) => Activity::Folder {
					name: name.trim().to_owned(),
					href,
				},
				_ => Activity::Unknown {
					kind: "folder without link".to_owned(),
				},
			}
		} else if classes.contains("modtype_label") {
			Activity::Label {
				text: node.text().collect::<String>(),
			}
		} else {
			Activity::Unknown { kind: modtype(classes) }
		};
		activities.push(activity);
	}
	activities
}

fn first_href(node: ElementRef) -> Option<String> {
	node.select(&LINKS)
		.next()
		.and_then(|a| a.value().attr("href"))
		.map(|href| href.to_owned())
}

fn modtype(classes: &str) -> String {
	classes
		.split_whitespace()
		.find_map(|class| class.strip_prefix("modtype_"))
		.unwrap_or("activity")
		.to_owned()
}

/// Some instructors leave the default "Thema ..." as the section name and
/// put the real title on the first line of the summary. Use that line as
/// the name and keep the remaining lines as the description.
fn derive_title(name: String, summary: String) -> (String, String) {
	if summary.is_empty() || !name.contains("Thema") {
		return (name, summary);
	}
	let mut lines = summary.split('\n');
	let name = lines.next().unwrap_or_default().trim().trim_matches(':').replace('/', "-");
	let description = lines.collect::<Vec<_>>().join("\n");
	(name, description)
}

/// Materializes one section: its directory, its description and every
/// resource and folder directly below it, in document order.
pub async fn download(moodle: &Moodle, section: &Section, path: &Path) -> Result<Totals> {
	let mut totals = Totals::default();
	let (dir, own_dir) = match section {
		Section::General { description, .. } => {
			if let Some(info) = description {
				match file::save_info(path, info).await {
					Ok(Some(status)) => totals.record(status),
					Ok(None) => {},
					Err(e) => error!("couldn't save course description"; e),
				}
			}
			(path.to_owned(), false)
		},
		Section::Named { name, description, .. } => {
			totals.sections += 1;
			let dir = create_section_dir(path, name).await?;
			log!(0, "       |  +--{}", name.bold());
			if !description.is_empty() {
				match file::save_info(&dir, description).await {
					Ok(Some(status)) => totals.record(status),
					Ok(None) => {},
					Err(e) => error!("couldn't save section description"; e),
				}
			}
			(dir, true)
		},
	};
	for activity in section.activities() {
		match activity {
			Activity::Resource { href } => {
				if let Some((src, name)) = resource::resolve(moodle, href).await? {
					match file::save_file(moodle, &src, &dir, &name).await {
						Ok(status) => totals.record(status),
						Err(e) => error!("couldn't save file {}", name; e),
					}
				}
			},
			Activity::Folder { name, href } => {
				totals.merge(folder::download(moodle, name, href, &dir).await?);
			},
			Activity::Label { .. } => {},
			Activity::Unknown { kind } => log!(1, "Ignored {}", kind),
		}
	}
	if own_dir {
		prune_empty_dir(&dir).await?;
	}
	Ok(totals)
}

/// Creates the section directory, retrying once with the name truncated to
/// 60 characters if the filesystem rejects it. A second failure propagates.
async fn create_section_dir(parent: &Path, name: &str) -> Result<PathBuf> {
	let escaped = file_escape(name);
	let escaped = if escaped.is_empty() { "unnamed".to_owned() } else { escaped };
	let dir = parent.join(&escaped);
	if fs::metadata(&dir).await.is_ok() {
		return Ok(dir);
	}
	if fs::create_dir_all(&dir).await.is_ok() {
		return Ok(dir);
	}
	// file name too long
	let short = escaped.chars().take(60).collect::<String>();
	let dir = parent.join(short);
	if fs::metadata(&dir).await.is_err() {
		fs::create_dir_all(&dir).await.context("failed to create section directory")?;
	}
	Ok(dir)
}
