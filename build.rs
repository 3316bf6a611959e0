use std::env;
use time::OffsetDateTime;

fn main() {
    // Honor SOURCE_DATE_EPOCH for reproducible builds.
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    let build_year = env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|epoch| OffsetDateTime::from_unix_timestamp(epoch).ok())
        .map(|dt| dt.year())
        .unwrap_or_else(|| OffsetDateTime::now_utc().year());
    println!("cargo:rustc-env=PILOT_BUILD_YEAR={build_year}");

    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let profile = env::var("PROFILE").unwrap_or_default();
    let display = if profile == "release" {
        version
    } else {
        format!("{version}-dev")
    };
    println!("cargo:rustc-env=PILOT_VERSION_DISPLAY={display}");
}
