use colored::Colorize;
use fhircohort_core::MedicationKind;
use tabled::builder::Builder;
use tabled::settings::Style;

use fhircohort_pipeline::metadata::{FrequencyTable, MedicationCounts};
use fhircohort_pipeline::orchestrator::FetchSummary;
use fhircohort_pipeline::pipeline::{AnalysisReport, CohortReport};

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_frequencies(title: &str, table: &FrequencyTable) {
    println!("{}", title.cyan());
    if table.is_empty() {
        println!("No matching codes.");
        return;
    }
    let mut rows: Vec<(&String, &u64)> = table.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let mut builder = Builder::default();
    builder.push_record(["Code", "Count"]);
    for (code, count) in rows {
        builder.push_record([code.clone(), count.to_string()]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn print_medications(kind: MedicationKind, counts: &MedicationCounts) {
    println!("{}", kind.resource_type().cyan());
    if counts.is_empty() {
        println!("No stored entries.");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["ResourceType", "Code", "Count"]);
    for (resource_type, tally) in counts {
        for detail in &tally.counting.details_count {
            for (code, count) in detail {
                builder.push_record([resource_type.clone(), code.clone(), count.to_string()]);
            }
        }
        builder.push_record([
            resource_type.clone(),
            "total".to_string(),
            tally.counting.total_count.to_string(),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn print_fetch_summaries(summaries: &[FetchSummary]) {
    let mut builder = Builder::default();
    builder.push_record(["Kind", "Patients", "With results", "Failed", "Entries"]);
    for s in summaries {
        builder.push_record([
            s.kind.to_string(),
            s.dispatched.to_string(),
            s.patients_with_results.to_string(),
            s.failed.to_string(),
            s.entries.to_string(),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn print_cohort(report: &CohortReport) {
    print_success(&format!(
        "{} candidate patients, {} with a main diagnosis ({} main diagnoses)",
        report.candidates,
        report.main.cohort.len(),
        report.main.total()
    ));
    print_frequencies("Main diagnoses", &report.main.counts);
}

pub fn print_analysis(report: &AnalysisReport) {
    print_frequencies("Observations", &report.observations);
    print_frequencies("Secondary conditions", &report.secondary_conditions.counts);
    println!(
        "{}: {}",
        "Patients with secondary conditions".cyan(),
        report.secondary_conditions.patients.len()
    );
    for (kind, counts) in &report.medications {
        print_medications(*kind, counts);
    }
}
