pub mod toml_loader;

pub use toml_loader::{load_all_practice_files, load_practice_session};
