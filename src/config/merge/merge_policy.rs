//! Built-in defaults, the lowest-precedence layer.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with the built-in defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("engine.item_delay_ms", 2000)?
        .set_default("engine.overwrite_existing", false)?
        .set_default("generation.mode", "service")?
        .set_default("generation.timeout_secs", 120)?
        .set_default("generation.connect_timeout_secs", 10)?
        .set_default("storage.store_path", ".finsynth/store")?
        .set_default("storage.checkpoint_backend", "sled")?
        .set_default("storage.checkpoint_path", ".finsynth/checkpoint.json")?
        .set_default("directory.path", "customers.json")?
        .set_default("logging.level", "info")
}
