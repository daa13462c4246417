// visitlog platform paths
// Resolves where persisted history lives on Windows, macOS, and Linux.
//
// Uses `cfg(target_os)` to select the platform implementation at compile time.

use std::path::PathBuf;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

/// Returns the platform-specific data directory for visitlog.
///
/// - **Linux**: `~/.local/share/visitlog` (or `$XDG_DATA_HOME/visitlog`)
/// - **macOS**: `~/Library/Application Support/visitlog`
/// - **Windows**: `%APPDATA%/visitlog`
/// - elsewhere: `./visitlog`
pub fn get_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        linux::get_data_dir()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_data_dir()
    }
    #[cfg(target_os = "windows")]
    {
        windows::get_data_dir()
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        PathBuf::from("visitlog")
    }
}
