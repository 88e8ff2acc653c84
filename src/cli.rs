// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;

use anyhow::{Context, Result};
use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
#[structopt(name = env!("CARGO_PKG_NAME"))]
pub struct Opt {
	/// Base URL of the Moodle instance, e.g. https://moodle.example.edu/
	#[structopt(short, long)]
	pub url: String,

	/// Output directory
	#[structopt(short, long, parse(from_os_str))]
	pub output: PathBuf,

	/// Verbose logging
	#[structopt(short, multiple = true, parse(from_occurrences))]
	pub verbose: usize,

	/// Proxy, e.g. socks5h://127.0.0.1:1080
	#[structopt(short, long)]
	pub proxy: Option<String>,

	/// Moodle account username
	#[structopt(short = "U", long)]
	pub username: Option<String>,

	/// Moodle account password
	#[structopt(short = "P", long)]
	pub password: Option<String>,

	/// Attempt to re-use session cookies
	#[structopt(long)]
	pub keep_session: bool,
}

pub static LOG_LEVEL: AtomicUsize = AtomicUsize::new(0);

macro_rules! log {
	($lvl:expr, $($t:expr),+) => {{
		#[allow(unused_imports)]
		use colored::Colorize as _;
		#[allow(unused_comparisons)] // 0 <= 0
		if $lvl <= crate::cli::LOG_LEVEL.load(std::sync::atomic::Ordering::SeqCst) {
			println!($($t),+);
		}
	}}
}

macro_rules! info {
	($t:tt) => {
		log!(0, $t);
	};
}

macro_rules! success {
	($t:tt) => {
		log!(0, "{}", format!($t).bright_green());
	};
}

macro_rules! warning {
	($e:expr) => {{
		log!(0, "Warning: {}", format!("{:?}", $e).bright_yellow());
	}};
	($msg:expr, $e:expr) => {{
		log!(0, "Warning: {}", format!("{} {:?}", $msg, $e).bright_yellow());
	}};
	(format => $($e:expr),+) => {{
		log!(0, "Warning: {}", format!($($e),+).bright_yellow());
	}};
	($lvl:expr; $($e:expr),+) => {{
		log!($lvl, "Warning: {}", format!($($e),+).bright_yellow());
	}};
}

macro_rules! error {
	($($prefix:expr),+; $e:expr) => {{
		log!(0, "{}: {}", format!($($prefix),+), format!("{:?}", $e).bright_red());
	}};
	($e:expr) => {{
		log!(0, "Error: {}", format!("{:?}", $e).bright_red());
	}};
}

pub fn ask_user_pass(opt: &Opt) -> Result<(String, String)> {
	let user = if let Some(username) = opt.username.as_ref() {
		username.clone()
	} else {
		rprompt::prompt_reply_stdout("Username: ").context("username prompt")?
	};
	let pass = if let Some(password) = opt.password.as_ref() {
		password.clone()
	} else {
		rpassword::read_password_from_tty(Some("Password: ")).context("password prompt")?
	};
	Ok((user, pass))
}
