use std::path::{Path, PathBuf};

pub mod csv_writer;
pub mod xyz_writer;

pub use csv_writer::CsvTrajectoryWriter;
pub use xyz_writer::XyzTrajectoryWriter;

/// Paths in a config file are relative to the config file, unless they are absolute or
/// explicitly relative to the working directory.
pub fn resolve_path(config_path: &Option<PathBuf>, file_path: &Path) -> PathBuf {
    if file_path.is_absolute() || file_path.starts_with("./") {
        return file_path.to_path_buf();
    }

    if let Some(path) = config_path.as_ref().and_then(|c| c.parent()) {
        path.join(file_path)
    } else {
        file_path.to_path_buf()
    }
}
