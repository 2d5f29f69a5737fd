use core::ffi::{CStr, c_char};
use std::{
    env,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use crate::{BoundaryError, BoxError};

pub const PLUGIN_PATH_VAR: &str = "TETHER_PLUGIN_PATH";
pub const PLUGIN_EXTENSION: &str = "plugin";

/// Parameter bag of the initialize entry point. A null bag, or a null
/// field, means the default.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InitParams {
    /// Plugin directories in the platform's path-list syntax.
    pub plugin_path: *const c_char,
    /// `env_logger` filter, e.g. `"tether=debug"`.
    pub log_filter: *const c_char,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            plugin_path: core::ptr::null(),
            log_filter: core::ptr::null(),
        }
    }
}

/// Owned, decoded form of [`InitParams`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    pub plugin_path: Vec<PathBuf>,
    pub log_filter: Option<String>,
}

unsafe fn optional_os(ptr: *const c_char) -> Option<OsString> {
    if ptr.is_null() {
        return None;
    }
    let c = unsafe { CStr::from_ptr(ptr) };
    Some(OsString::from(c.to_string_lossy().into_owned()))
}

impl InitOptions {
    /// # Safety
    ///
    /// `params` must be null or point to a valid [`InitParams`] whose string
    /// fields are null or NUL-terminated.
    pub unsafe fn from_params(params: *const InitParams) -> Self {
        let params = match unsafe { params.as_ref() } {
            Some(params) => *params,
            None => InitParams::default(),
        };
        let path = unsafe { optional_os(params.plugin_path) }
            .or_else(|| env::var_os(PLUGIN_PATH_VAR));
        let log_filter = unsafe { optional_os(params.log_filter) }
            .map(|f| f.to_string_lossy().into_owned());
        Self {
            plugin_path: path
                .map(|p| env::split_paths(&p).collect())
                .unwrap_or_default(),
            log_filter,
        }
    }
}

/// The external system started by the initialize entry point.
pub trait Initializer {
    fn initialize(&self, options: &InitOptions) -> Result<(), BoxError>;
}

/// Finds plugin files in every directory of the plugin path.
#[derive(Debug, Default)]
pub struct PluginDiscovery;

impl PluginDiscovery {
    pub fn discover(
        &self,
        dirs: &[PathBuf],
    ) -> Result<Vec<PathBuf>, BoundaryError> {
        let mut found = Vec::new();
        for dir in dirs {
            scan(dir, &mut found)?;
        }
        found.sort();
        Ok(found)
    }
}

fn scan(dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), BoundaryError> {
    let io = |source: std::io::Error| BoundaryError::Io {
        path: dir.to_path_buf(),
        source,
    };
    if !fs::metadata(dir).map_err(io)?.is_dir() {
        return Err(BoundaryError::NotADirectory(dir.to_path_buf()));
    }
    for entry in fs::read_dir(dir).map_err(io)? {
        let path = entry.map_err(io)?.path();
        if path.extension().is_some_and(|e| e == PLUGIN_EXTENSION) {
            log::info!("found plugin {}", path.display());
            found.push(path);
        }
    }
    Ok(())
}

impl Initializer for PluginDiscovery {
    fn initialize(&self, options: &InitOptions) -> Result<(), BoxError> {
        let plugins = self.discover(&options.plugin_path)?;
        log::debug!("{} plugin(s) discovered", plugins.len());
        Ok(())
    }
}

/// Sets up logging. Later calls keep the first logger.
pub fn init_logging(filter: Option<&str>) {
    let env = env_logger::Env::default().default_filter_or("warn");
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(filter) = filter {
        builder.parse_filters(filter);
    }
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn null_bag_means_defaults() {
        let options = unsafe { InitOptions::from_params(core::ptr::null()) };
        assert_eq!(options.log_filter, None);
    }

    #[test]
    fn bag_fields_are_decoded() {
        let path = env::join_paths(["/opt/a", "/opt/b"]).unwrap();
        let path = CString::new(path.to_string_lossy().into_owned()).unwrap();
        let filter = c"tether=trace";
        let params = InitParams {
            plugin_path: path.as_ptr(),
            log_filter: filter.as_ptr(),
        };
        let options = unsafe { InitOptions::from_params(&params) };
        assert_eq!(
            options.plugin_path,
            [PathBuf::from("/opt/a"), PathBuf::from("/opt/b")]
        );
        assert_eq!(options.log_filter.as_deref(), Some("tether=trace"));
    }

    #[test]
    fn discovery_lists_plugin_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x86.plugin"), b"").unwrap();
        fs::write(dir.path().join("arm.plugin"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let found = PluginDiscovery
            .discover(&[dir.path().to_path_buf()])
            .unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["arm.plugin", "x86.plugin"]);
    }

    #[test]
    fn discovery_fails_on_missing_or_file_entries() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lone.plugin");
        fs::write(&file, b"").unwrap();

        let err = PluginDiscovery.discover(&[file.clone()]).unwrap_err();
        assert!(matches!(err, BoundaryError::NotADirectory(p) if p == file));

        let missing = dir.path().join("missing");
        let err = PluginDiscovery.discover(&[missing]).unwrap_err();
        assert!(matches!(err, BoundaryError::Io { .. }));
    }
}
