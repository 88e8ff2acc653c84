// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::BufReader;
use std::sync::atomic::Ordering;
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use structopt::StructOpt;
use tokio::fs;

#[macro_use]
mod cli;
use cli::*;
mod moodle;
use moodle::{course, Moodle, Totals};
mod util;
use util::*;

#[tokio::main]
async fn main() {
	let opt = Opt::from_args();
	if let Err(e) = real_main(opt).await {
		error!(e);
		std::process::exit(1);
	}
}

async fn try_to_load_session(opt: Opt) -> Result<Moodle> {
	let session_path = opt.output.join(".moodlesession");
	let meta = fs::metadata(&session_path).await?;
	let modified = meta.modified()?;
	let now = SystemTime::now();
	// the previous session is only useful if it isn't older than ~1 hour
	let duration = now.duration_since(modified)?;
	if duration.as_secs() <= 60 * 60 {
		let file = std::fs::File::open(session_path)?;
		let cookies = cookie_store::CookieStore::load_json(BufReader::new(file))
			.map_err(|err| anyhow!(err))
			.context("failed to load session cookies")?;
		let cookie_store = reqwest_cookie_store::CookieStoreMutex::new(cookies);
		let cookie_store = std::sync::Arc::new(cookie_store);
		Ok(Moodle::with_session(opt, cookie_store).await?)
	} else {
		Err(anyhow!("session data too old"))
	}
}

async fn login(opt: Opt) -> Result<Moodle> {
	// load .moodlesession file
	if opt.keep_session {
		match try_to_load_session(opt.clone())
			.await
			.context("failed to load previous session")
		{
			Ok(moodle) => return Ok(moodle),
			Err(e) => warning!(e),
		}
	}

	// load .moodlelogin file
	let login_path = opt.output.join(".moodlelogin");
	let login = std::fs::read_to_string(&login_path);
	let (user, pass) = if let Ok(login) = login {
		let mut lines = login.split('\n');
		let user = lines.next().context("missing user in .moodlelogin")?;
		let pass = lines.next().context("missing password in .moodlelogin")?;
		(user.trim().to_owned(), pass.trim().to_owned())
	} else {
		ask_user_pass(&opt).context("credentials input failed")?
	};

	Moodle::login(opt, &user, &pass).await
}

async fn real_main(mut opt: Opt) -> Result<()> {
	LOG_LEVEL.store(opt.verbose, Ordering::SeqCst);
	#[cfg(windows)]
	let _ = colored::control::set_virtual_terminal(true);

	create_dir(&opt.output).await.context("failed to create output directory")?;
	// use UNC paths on Windows (to avoid the default max. path length of 255)
	opt.output = fs::canonicalize(opt.output).await.context("failed to canonicalize output directory")?;

	let moodle = login(opt).await?;

	info!("Fetching semesters..");
	let semesters = moodle.semesters().await?;
	for (id, name) in &semesters {
		log!(0, "[{}]: {}", id, name);
	}
	let semester_id = loop {
		let choice = rprompt::prompt_reply_stdout("Select semester: ").context("semester prompt")?;
		let choice = choice.trim().to_owned();
		if semesters.contains_key(&choice) {
			break choice;
		}
	};
	let semester = &semesters[&semester_id];

	info!("Fetching courses..");
	let courses = moodle.courses(&semester_id).await?;
	for (index, course) in courses.iter().enumerate() {
		log!(0, "[{}]: {}.{}: {}", index, course.key, course.semester_tag, course.name);
	}

	let choice =
		rprompt::prompt_reply_stdout("Course number to download, (a) for all or (q) to quit: ").context("course prompt")?;
	match choice.trim() {
		"q" => {},
		"a" => {
			for course in &courses {
				let totals = course::download(&moodle, course, semester, &moodle.opt.output).await?;
				report(&totals);
			}
		},
		number => {
			let index = number.parse::<usize>().context("not a course number")?;
			let course = courses.get(index).context("course number out of range")?;
			let totals = course::download(&moodle, course, semester, &moodle.opt.output).await?;
			report(&totals);
		},
	}

	if moodle.opt.keep_session {
		if let Err(e) = moodle.save_session().await.context("failed to save session cookies") {
			warning!(e)
		}
	}
	Ok(())
}

fn report(totals: &Totals) {
	log!(
		0,
		"{}",
		format!(
			"Processed {} files ({} saved, {} skipped) in {} sections!",
			totals.files(),
			totals.saved,
			totals.skipped,
			totals.sections
		)
		.bright_green()
	);
}
