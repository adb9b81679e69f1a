use clap::{Parser, Subcommand, ValueEnum};
use fhircohort_core::{MedicationKind, ResourceKind};

#[derive(Parser)]
#[command(name = "fhircohort")]
#[command(about = "Extract a diagnosis cohort from a FHIR server and count its codes")]
#[command(version)]
pub struct Cli {
    /// Subcommand; runs the whole pipeline when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to a TOML config file (defaults to ./fhircohort.toml if present)
    #[arg(short, long, global = true, env = "FHIRCOHORT_CONFIG")]
    pub config: Option<String>,

    /// Log level (overrides logging.level; RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find cohort patients and their main diagnoses
    Cohort,
    /// Fetch resources for every cohort patient
    Extract(ExtractArgs),
    /// Compute frequency tables from the result files
    Analyze,
    /// Cohort, extract and analyze in order
    Run,
    /// Print the effective configuration with secrets hidden
    Config,
}

#[derive(clap::Args)]
pub struct ExtractArgs {
    /// Resource kinds to fetch (all when omitted)
    #[arg(short, long, value_enum)]
    pub kind: Vec<KindArg>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Observation,
    Condition,
    MedicationAdministration,
    MedicationRequest,
    MedicationStatement,
}

impl From<KindArg> for ResourceKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Observation => ResourceKind::Observation,
            KindArg::Condition => ResourceKind::Condition,
            KindArg::MedicationAdministration => {
                ResourceKind::Medication(MedicationKind::Administration)
            }
            KindArg::MedicationRequest => ResourceKind::Medication(MedicationKind::Request),
            KindArg::MedicationStatement => ResourceKind::Medication(MedicationKind::Statement),
        }
    }
}

impl ExtractArgs {
    pub fn kinds(&self) -> Vec<ResourceKind> {
        if self.kind.is_empty() {
            return ResourceKind::ALL.to_vec();
        }
        let mut kinds: Vec<ResourceKind> = Vec::new();
        for &arg in &self.kind {
            let kind = ResourceKind::from(arg);
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }
}
