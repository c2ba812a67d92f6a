//! Конфигурация узла.
//!
//! Значения по умолчанию, необязательный TOML-файл и переменные окружения
//! `EXTNODE_*` собираются через крейт `config`.

pub mod settings;

pub use settings::{NodeConfig, ENV_PREFIX};
