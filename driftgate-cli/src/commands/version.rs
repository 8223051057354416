//! Version subcommand implementation

use driftgate_common::{DEFAULT_IDLE_INTERVAL, DEFAULT_MAX_LIFETIME};
use humantime::format_duration;

pub fn run() {
    println!("driftgate {}", env!("CARGO_PKG_VERSION"));
    println!(
        "defaults: max lifetime {}, idle interval {}",
        format_duration(DEFAULT_MAX_LIFETIME),
        format_duration(DEFAULT_IDLE_INTERVAL),
    );

    #[cfg(target_os = "linux")]
    println!("target: linux");
    #[cfg(target_os = "macos")]
    println!("target: macos");
    #[cfg(target_os = "windows")]
    println!("target: windows");
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    println!("target: unknown");
}
