use std::env;
use std::process::Command;

use time::OffsetDateTime;
use time::macros::format_description;

/// Stamps the binary with the source revision and the day it was built.
fn main() {
    for var in ["SOURCE_DATE_EPOCH", "WAVESYNC_REVISION"] {
        println!("cargo:rerun-if-env-changed={var}");
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let revision = env::var("WAVESYNC_REVISION")
        .ok()
        .or_else(describe_checkout)
        .unwrap_or_else(|| "untracked".into());
    println!("cargo:rustc-env=WAVESYNC_REVISION={revision}");
    println!("cargo:rustc-env=WAVESYNC_BUILD_DAY={}", build_day());
}

/// `git describe` of the checkout, marked `-dirty` when the tree has edits.
fn describe_checkout() -> Option<String> {
    let out = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=10"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8(out.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

fn build_day() -> String {
    let when = match env::var("SOURCE_DATE_EPOCH").map(|v| v.parse::<i64>()) {
        Ok(Ok(secs)) => {
            OffsetDateTime::from_unix_timestamp(secs).unwrap_or(OffsetDateTime::UNIX_EPOCH)
        }
        _ => OffsetDateTime::now_utc(),
    };
    when.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "undated".into())
}
