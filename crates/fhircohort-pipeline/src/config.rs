use std::path::PathBuf;
use std::time::Duration;

use fhircohort_client::{Credentials, FetchOptions, MedicationJoin, RetryPolicy};
use fhircohort_core::VocabularySystems;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    /// Credentials for the FHIR server, tagged by `type`
    #[serde(default)]
    pub auth: Credentials,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub vocabularies: VocabularySystems,
    #[serde(default)]
    pub inputs: InputFiles,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.base_url.trim().is_empty() {
            return Err("server.base_url must not be empty".into());
        }
        if let Err(e) = url::Url::parse(&self.server.base_url) {
            return Err(format!("server.base_url is not a valid URL: {e}"));
        }
        if self.server.timeout_secs == 0 {
            return Err("server.timeout_secs must be > 0".into());
        }
        // Fetch validations
        if self.fetch.max_workers == 0 {
            return Err("fetch.max_workers must be > 0".into());
        }
        if self.fetch.page_size == 0 || self.fetch.encounter_page_size == 0 {
            return Err("fetch page sizes must be > 0".into());
        }
        if self.fetch.condition_batch_size == 0 {
            return Err("fetch.condition_batch_size must be > 0".into());
        }
        // Retry validations
        if self.retry.max_attempts == Some(0) {
            return Err("retry.max_attempts must be > 0 when set".into());
        }
        if self.retry.multiplier < 1.0 {
            return Err("retry.multiplier must be >= 1.0".into());
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err("retry.max_delay_ms must be >= retry.initial_delay_ms".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            page_size: self.fetch.page_size,
            condition_batch_size: self.fetch.condition_batch_size,
            retry: self.retry.clone(),
        }
    }

    /// Copy safe to print: secrets replaced.
    pub fn redacted(&self) -> AppConfig {
        let mut cfg = self.clone();
        cfg.auth = match cfg.auth {
            Credentials::Basic { username, .. } => Credentials::Basic {
                username,
                password: REDACTED.into(),
            },
            Credentials::Bearer { .. } => Credentials::Bearer {
                token: REDACTED.into(),
            },
            Credentials::OauthPassword {
                username,
                client_id,
                token_url,
                ..
            } => Credentials::OauthPassword {
                username,
                password: REDACTED.into(),
                client_id,
                token_url,
            },
            Credentials::None => Credentials::None,
        };
        cfg
    }
}

const REDACTED: &str = "********";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// FHIR base URL, e.g. https://fhir.example.org/fhir
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/fhir".into()
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Concurrency limit of the per-patient worker pool
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_encounter_page_size")]
    pub encounter_page_size: u32,
    #[serde(default = "default_condition_batch_size")]
    pub condition_batch_size: usize,
    #[serde(default)]
    pub medication_join: MedicationJoin,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            page_size: default_page_size(),
            encounter_page_size: default_encounter_page_size(),
            condition_batch_size: default_condition_batch_size(),
            medication_join: MedicationJoin::default(),
        }
    }
}

fn default_max_workers() -> usize {
    8
}
fn default_page_size() -> u32 {
    fhircohort_client::fetchers::DEFAULT_PAGE_SIZE
}
fn default_encounter_page_size() -> u32 {
    10
}
fn default_condition_batch_size() -> usize {
    fhircohort_client::fetchers::DEFAULT_CONDITION_BATCH_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFiles {
    /// Codes selecting the cohort (main diagnoses)
    #[serde(default = "default_main_diagnosis_codes")]
    pub main_diagnosis_codes: PathBuf,
    /// ICD code groups for secondary conditions
    #[serde(default = "default_icd_codes")]
    pub icd_codes: PathBuf,
    #[serde(default = "default_loinc_codes")]
    pub loinc_codes: PathBuf,
    #[serde(default = "default_atc_codes")]
    pub atc_codes: PathBuf,
    /// Every patient with a qualifying condition (intermediate)
    #[serde(default = "default_candidates_file")]
    pub candidates_file: PathBuf,
    /// Patients whose condition is a main diagnosis; drives extraction
    #[serde(default = "default_cohort_file")]
    pub cohort_file: PathBuf,
}

impl Default for InputFiles {
    fn default() -> Self {
        Self {
            main_diagnosis_codes: default_main_diagnosis_codes(),
            icd_codes: default_icd_codes(),
            loinc_codes: default_loinc_codes(),
            atc_codes: default_atc_codes(),
            candidates_file: default_candidates_file(),
            cohort_file: default_cohort_file(),
        }
    }
}

fn default_main_diagnosis_codes() -> PathBuf {
    PathBuf::from("codes/main_diagnosis_codes.json")
}
fn default_icd_codes() -> PathBuf {
    PathBuf::from("codes/icd_codes.json")
}
fn default_loinc_codes() -> PathBuf {
    PathBuf::from("codes/loinc_codes.json")
}
fn default_atc_codes() -> PathBuf {
    PathBuf::from("codes/atc_codes.json")
}
fn default_candidates_file() -> PathBuf {
    PathBuf::from("patients_diagnosed.json")
}
fn default_cohort_file() -> PathBuf {
    PathBuf::from("patients_main_diagnosed.json")
}

/// How result files are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileNaming {
    /// `{Patient-id}_patient_{suffix}.json`
    #[default]
    PatientId,
    /// `{n}_patient_{suffix}.json`, n = completion index (legacy layout)
    CompletionOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_output_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub naming: FileNaming,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            naming: FileNaming::default(),
        }
    }
}

impl OutputSettings {
    pub fn metadata_path(&self) -> PathBuf {
        self.root.join("metadata.json")
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("fhir_results")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "fhircohort.toml";

    /// Load the optional TOML file, then apply `FHIRCOHORT__SECTION__KEY`
    /// environment overrides, then validate.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if !pathbuf.exists() {
                    return Err(format!("config file not found: {p}"));
                }
                builder = builder.add_source(File::from(pathbuf));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix("FHIRCOHORT")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
