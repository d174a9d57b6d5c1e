//! ConfigLoader: assembles the layered sources into a `FinsynthConfig`.

use super::merge::builder_with_defaults;
use super::sources::{environment, global_file, workspace_file};
use super::FinsynthConfig;
use config::File;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): built-in defaults, global file, workspace files,
    /// `FINSYNTH__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<FinsynthConfig, config::ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Load from a single file on top of the defaults. Environment variables still apply.
    pub fn load_from_file(path: &Path) -> Result<FinsynthConfig, config::ConfigError> {
        let builder = builder_with_defaults()?.add_source(File::from(path.to_path_buf()));
        environment::add_to_builder(builder)
            .build()?
            .try_deserialize()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    /// Defaults only, no files or environment.
    pub fn defaults() -> Result<FinsynthConfig, config::ConfigError> {
        builder_with_defaults()?.build()?.try_deserialize()
    }
}
