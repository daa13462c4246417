// visitlog data path for Linux: $XDG_DATA_HOME/visitlog or ~/.local/share/visitlog

use std::env;
use std::path::PathBuf;

pub fn get_data_dir() -> PathBuf {
    data_dir_from(env::var("XDG_DATA_HOME").ok(), env::var("HOME").ok())
}

fn data_dir_from(xdg_data_home: Option<String>, home: Option<String>) -> PathBuf {
    match xdg_data_home.filter(|x| !x.is_empty()) {
        Some(xdg) => PathBuf::from(xdg).join("visitlog"),
        None => {
            let home = home.unwrap_or_else(|| String::from("/tmp"));
            PathBuf::from(home).join(".local").join("share").join("visitlog")
        }
    }
}
