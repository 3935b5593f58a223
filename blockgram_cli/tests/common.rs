use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub fn blockgram_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("blockgram"));
	cmd.env("NO_COLOR", "1");
	cmd.env_remove("BLOCKGRAM_LOG");
	cmd
}

#[allow(dead_code)]
pub const PARAGRAPH_DOCUMENT: &str =
	"<!-- block:paragraph -->\n<p>Hello</p>\n<!-- /block:paragraph -->\n";
