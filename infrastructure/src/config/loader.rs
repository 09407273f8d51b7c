//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "reagent";
const PROJECT_FILES: [&str; 2] = ["reagent.toml", ".reagent.toml"];
const ENV_PREFIX: &str = "REAGENT_";

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. `REAGENT_*` environment variables (`REAGENT_MODEL__NAME=...`)
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./reagent.toml` or `./.reagent.toml`
    /// 4. Global: `<config dir>/reagent/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&PathBuf>) -> Result<FileConfig, Box<figment::Error>> {
        Self::load_from(Self::global_config_path().as_deref(), Path::new("."), config_path)
    }

    /// [`load`](Self::load) with explicit global file and project directory.
    pub fn load_from(
        global: Option<&Path>,
        project_dir: &Path,
        config_path: Option<&PathBuf>,
    ) -> Result<FileConfig, Box<figment::Error>> {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global) = global
            && global.exists()
        {
            figment = figment.merge(Toml::file(global));
        }

        if let Some(project) = Self::project_config_in(project_dir) {
            figment = figment.merge(Toml::file(project));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract().map_err(Box::new)
    }

    /// `<config dir>/reagent/config.toml`, e.g. `~/.config/reagent/config.toml`.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    /// The project-level config file in the working directory, if any.
    pub fn project_config_path() -> Option<PathBuf> {
        Self::project_config_in(Path::new("."))
    }

    fn project_config_in(dir: &Path) -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Config file locations, for `--verbose` startup output.
    pub fn describe_sources(config_path: Option<&PathBuf>) -> Vec<(String, bool)> {
        let mut sources = Vec::new();
        if let Some(path) = config_path {
            sources.push((format!("Explicit: {}", path.display()), path.exists()));
        }
        match Self::project_config_path() {
            Some(path) => sources.push((format!("Project: {}", path.display()), true)),
            None => sources.push(("Project: ./reagent.toml or ./.reagent.toml".to_string(), false)),
        }
        if let Some(path) = Self::global_config_path() {
            let exists = path.exists();
            sources.push((format!("Global:  {}", path.display()), exists));
        }
        sources
    }
}
