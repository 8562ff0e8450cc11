use std::{fmt, path::Path};

use anyhow::Context;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, builder::DefaultState};
use serde::{
    Deserialize, Deserializer,
    de::{DeserializeOwned, MapAccess, Visitor},
};
use url::Url;

use crate::csv_export::OutputEncoding;

/// Name of the settings layer used when neither `--env` nor `APP_ENV` is given.
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Prefix of environment variables that override settings, e.g. `SCRAPER__URI`.
pub const ENV_PREFIX: &str = "SCRAPER";

/// Separator of the area list in a `SCRAPER__AREAS__<REGION>` variable.
pub const AREA_LIST_SEPARATOR: &str = ",";

/// The process env vars read before anything else.
#[derive(Debug, Default, Deserialize)]
pub struct RuntimeEnv {
    #[serde(default)]
    pub app_env: Option<String>,
    #[serde(default)]
    pub chromium_remote_debugging_url: Option<String>,
}

impl RuntimeEnv {
    pub fn environment(&self) -> &str {
        self.app_env.as_deref().unwrap_or(DEFAULT_ENVIRONMENT)
    }
}

/// Settings of a scraping job, layered from defaults, per-environment files and env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Output CSV path.
    pub filename: String,
    /// Encoding label of the output file (`utf-8`, `utf-8-sig`, `shift_jis`, `cp932`, ...).
    pub csv_file_encoding: String,
    /// Base URI of the directory site, or a `file://` fixture page.
    pub uri: String,
    /// Region name -> area search terms, in the order the regions are written.
    #[serde(default, deserialize_with = "regions_in_order")]
    pub areas: Vec<(String, Vec<String>)>,
    /// Listings per result page; a shorter page is the last one.
    pub per_page: u32,
    /// Minimum number of seconds between two page fetches.
    pub interval_secs: u64,
    pub browser: BrowserSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Start an Xvfb display for the browser process.
    pub virtual_display: bool,
    pub display: String,
    pub geckodriver_path: String,
    #[serde(default)]
    pub chrome_path: Option<String>,
}

impl Settings {
    /// Loads `{config_dir}/default.toml`, then `{config_dir}/{environment}.toml`,
    /// then `SCRAPER__*` environment variables.
    pub fn load(config_dir: &Path, environment: &str) -> anyhow::Result<Self> {
        Self::load_with_env(config_dir, environment, None)
    }

    pub(crate) fn load_with_env(
        config_dir: &Path,
        environment: &str,
        env_source: Option<config::Map<String, String>>,
    ) -> anyhow::Result<Self> {
        let mut builder = defaults()?
            .add_source(File::from(config_dir.join("default.toml")).required(false));
        if environment != DEFAULT_ENVIRONMENT {
            builder = builder.add_source(
                File::from(config_dir.join(format!("{environment}.toml"))).required(false),
            );
        }
        let area_keys = match &env_source {
            Some(vars) => area_list_keys(vars.keys()),
            None => {
                let vars: Vec<String> = std::env::vars_os()
                    .filter_map(|(key, _)| key.into_string().ok())
                    .collect();
                area_list_keys(vars.iter())
            }
        };
        let mut environment_source = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env_source);
        if !area_keys.is_empty() {
            environment_source = environment_source.list_separator(AREA_LIST_SEPARATOR);
            for key in area_keys {
                environment_source = environment_source.with_list_parse_key(&key);
            }
        }
        let builder = builder.add_source(environment_source);

        let settings: Settings = builder
            .build()?
            .try_deserialize()
            .with_context(|| format!("invalid settings for environment {environment:?}"))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults overlaid with a single TOML document.
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let settings: Settings = defaults()?
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()
            .context("invalid settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// All area search terms, regions in file order.
    pub fn area_list(&self) -> Vec<String> {
        self.areas
            .iter()
            .flat_map(|(_, areas)| areas.iter().cloned())
            .collect()
    }

    pub fn output_encoding(&self) -> Result<OutputEncoding, ConfigError> {
        OutputEncoding::from_label(&self.csv_file_encoding).ok_or_else(|| {
            ConfigError::Message(format!(
                "unknown csv_file_encoding {:?}",
                self.csv_file_encoding
            ))
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let uri = Url::parse(&self.uri)
            .map_err(|e| ConfigError::Message(format!("uri {:?} is not a URL: {e}", self.uri)))?;
        if !matches!(uri.scheme(), "http" | "https" | "file") {
            return Err(ConfigError::Message(format!(
                "uri scheme {:?} is not supported",
                uri.scheme()
            )));
        }
        if self.area_list().is_empty() {
            return Err(ConfigError::Message("no areas configured".to_string()));
        }
        if self.per_page == 0 {
            return Err(ConfigError::Message("per_page must be positive".to_string()));
        }
        self.output_encoding()?;
        Ok(())
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("filename", "output.csv")?
        .set_default("csv_file_encoding", "utf-8")?
        .set_default("per_page", 20)?
        .set_default("interval_secs", 3)?
        .set_default("browser.headless", true)?
        .set_default("browser.virtual_display", false)?
        .set_default("browser.display", ":99")?
        .set_default("browser.geckodriver_path", "geckodriver")
}

// `SCRAPER__AREAS__TOKYO` -> `areas.tokyo`, so the value is split into a list.
fn area_list_keys<'a>(vars: impl Iterator<Item = &'a String>) -> Vec<String> {
    let prefix = format!("{ENV_PREFIX}__AREAS__");
    vars.filter_map(|var| {
        let region = var.strip_prefix(&prefix)?;
        (!region.is_empty()).then(|| format!("areas.{}", region.to_lowercase()))
    })
    .collect()
}

fn regions_in_order<'de, D>(deserializer: D) -> Result<Vec<(String, Vec<String>)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Regions;

    impl<'de> Visitor<'de> for Regions {
        type Value = Vec<(String, Vec<String>)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a table of region name to area list")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut regions = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry()? {
                regions.push(entry);
            }
            Ok(regions)
        }
    }

    deserializer.deserialize_map(Regions)
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config =
            envy::from_env::<Self>().context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        uri = "https://directory.example.com"

        [areas]
        tokyo = ["新宿区", "渋谷区"]
        osaka = ["北区"]
    "#;

    #[test]
    fn defaults_fill_unset_keys() {
        let settings = Settings::from_toml(MINIMAL).unwrap();
        assert_eq!(settings.filename, "output.csv");
        assert_eq!(settings.csv_file_encoding, "utf-8");
        assert_eq!(settings.per_page, 20);
        assert_eq!(settings.interval_secs, 3);
        assert!(settings.browser.headless);
        assert!(!settings.browser.virtual_display);
        assert_eq!(settings.browser.geckodriver_path, "geckodriver");
        assert_eq!(settings.browser.chrome_path, None);
    }

    #[test]
    fn areas_flatten_in_file_order() {
        let settings = Settings::from_toml(MINIMAL).unwrap();
        assert_eq!(settings.area_list(), vec!["新宿区", "渋谷区", "北区"]);
        assert_eq!(settings.areas[0].0, "tokyo");
    }

    #[test]
    fn shipped_default_config_starts_with_tokyo() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
        let settings = Settings::load_with_env(&dir, "default", Some(Default::default())).unwrap();
        let areas = settings.area_list();
        assert_eq!(areas.first().map(String::as_str), Some("千代田区"));
        assert_eq!(areas.last().map(String::as_str), Some("川崎市"));
    }

    #[test]
    fn env_var_replaces_one_region_of_areas() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.toml"), MINIMAL).unwrap();

        let mut env = config::Map::new();
        env.insert("SCRAPER__AREAS__TOKYO".to_string(), "目黒区,品川区".to_string());

        let settings = Settings::load_with_env(dir.path(), "default", Some(env)).unwrap();
        assert_eq!(settings.area_list(), vec!["目黒区", "品川区", "北区"]);
    }

    #[test]
    fn single_area_from_env_is_a_list() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.toml"), MINIMAL).unwrap();

        let mut env = config::Map::new();
        env.insert("SCRAPER__AREAS__OSAKA".to_string(), "中央区".to_string());

        let settings = Settings::load_with_env(dir.path(), "default", Some(env)).unwrap();
        assert_eq!(settings.area_list(), vec!["新宿区", "渋谷区", "中央区"]);
    }

    #[test]
    fn area_env_vars_map_to_list_keys() {
        let vars = [
            "SCRAPER__AREAS__TOKYO".to_string(),
            "SCRAPER__URI".to_string(),
            "SCRAPER__AREAS__".to_string(),
        ];
        assert_eq!(area_list_keys(vars.iter()), vec!["areas.tokyo"]);
    }

    #[test]
    fn missing_uri_is_rejected() {
        let err = Settings::from_toml("[areas]\ntokyo = [\"新宿区\"]").unwrap_err();
        assert!(format!("{err:#}").contains("uri"));
    }

    #[test]
    fn empty_areas_are_rejected() {
        let err = Settings::from_toml("uri = \"https://example.com\"").unwrap_err();
        assert!(format!("{err:#}").contains("no areas"));
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let text = format!("csv_file_encoding = \"klingon\"\n{MINIMAL}");
        let err = Settings::from_toml(&text).unwrap_err();
        assert!(format!("{err:#}").contains("klingon"));
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let text = MINIMAL.replace("https://directory.example.com", "ftp://example.com");
        assert!(Settings::from_toml(&text).is_err());
    }

    #[test]
    fn environment_file_overrides_default_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.toml"), MINIMAL).unwrap();
        std::fs::write(
            dir.path().join("test.toml"),
            "filename = \"test.csv\"\nuri = \"file:///tmp/html/tp_kaigo_00.html\"\n",
        )
        .unwrap();

        let default = Settings::load_with_env(dir.path(), "default", Some(Default::default())).unwrap();
        assert_eq!(default.filename, "output.csv");

        let test = Settings::load_with_env(dir.path(), "test", Some(Default::default())).unwrap();
        assert_eq!(test.filename, "test.csv");
        assert_eq!(test.uri, "file:///tmp/html/tp_kaigo_00.html");
        assert_eq!(test.area_list().len(), 3);
    }

    #[test]
    fn env_vars_override_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.toml"), MINIMAL).unwrap();

        let mut env = config::Map::new();
        env.insert("SCRAPER__FILENAME".to_string(), "from_env.csv".to_string());
        env.insert("SCRAPER__PER_PAGE".to_string(), "50".to_string());
        env.insert("SCRAPER__BROWSER__HEADLESS".to_string(), "false".to_string());

        let settings = Settings::load_with_env(dir.path(), "default", Some(env)).unwrap();
        assert_eq!(settings.filename, "from_env.csv");
        assert_eq!(settings.per_page, 50);
        assert!(!settings.browser.headless);
    }

    #[test]
    fn missing_config_dir_falls_back_to_env_only() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load_with_env(&dir.path().join("nope"), "default", Some(Default::default()))
            .unwrap_err();
        assert!(format!("{err:#}").contains("uri"));
    }

    #[test]
    fn runtime_env_defaults_to_default_environment() {
        assert_eq!(RuntimeEnv::default().environment(), DEFAULT_ENVIRONMENT);
        let runtime = RuntimeEnv {
            app_env: Some("test".to_string()),
            chromium_remote_debugging_url: None,
        };
        assert_eq!(runtime.environment(), "test");
    }
}
