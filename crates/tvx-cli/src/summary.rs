//! Run summaries on stderr.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use tvx_cli::commands::{EventRun, ExposeRun, MergeRun};
use tvx_core::Coverage;
use tvx_output::RateSummary;

/// Subjects listed individually in the coverage table.
const COVERAGE_ROWS: usize = 20;

pub fn print_expose_summary(run: &ExposeRun) {
    let summary = &run.result.summary;
    let report = &run.result.report;
    let mut table = metric_table();
    add_metric(&mut table, "Subjects", summary.persons);
    add_metric(&mut table, "Segments", summary.segments);
    add_metric(&mut table, "Person-days", summary.person_days);
    add_metric(&mut table, "Exposed person-days", summary.non_reference_days);
    add_metric(&mut table, "Intervals kept", report.kept);
    add_metric(&mut table, "Intervals clipped", report.clipped);
    add_warning(&mut table, "Reversed intervals dropped", report.reversed);
    add_warning(&mut table, "Intervals outside window", report.outside_window);
    add_warning(&mut table, "Intervals without subject", report.unmatched);
    add_warning(&mut table, "Intervals dropped (total)", report.dropped());
    add_metric(&mut table, "Never exposed subjects", report.unexposed_subjects);
    if run.without_covariates > 0 {
        add_warning(&mut table, "Subjects without kept columns", run.without_covariates);
    }
    print_output_line(run.output.as_deref());
    eprintln!("{table}");
    if let Some(coverage) = &run.coverage {
        print_coverage(coverage);
    }
}

pub fn print_merge_summary(run: &MergeRun) {
    let summary = &run.result.summary;
    let mut table = metric_table();
    add_metric(&mut table, "Input tables", run.inputs);
    add_metric(&mut table, "Subjects", summary.persons);
    add_metric(&mut table, "Rows", summary.rows);
    add_metric(
        &mut table,
        "Rows per subject (mean)",
        format!("{:.2}", summary.mean_rows_per_person),
    );
    add_metric(&mut table, "Rows per subject (max)", summary.max_rows_per_person);
    add_warning(&mut table, "Subjects filled with reference", summary.defaulted);
    print_output_line(run.output.as_deref());
    eprintln!("{table}");
}

pub fn print_event_summary(run: &EventRun) {
    let summary = &run.result.summary;
    let mut table = metric_table();
    add_metric(&mut table, "Rows", summary.rows);
    for (code, count) in &summary.flagged {
        let label = if *code == 1 {
            "Events (code 1)".to_string()
        } else {
            format!("Competing events (code {code})")
        };
        add_metric(&mut table, &label, *count);
    }
    add_metric(&mut table, "Subjects censored early", summary.censored_subjects);
    add_warning(&mut table, "Events without subject", summary.unmatched);
    add_warning(&mut table, "Events on a segment start", summary.at_segment_start);
    if run.without_covariates > 0 {
        add_warning(&mut table, "Subjects without kept columns", run.without_covariates);
    }
    print_output_line(run.output.as_deref());
    eprintln!("{table}");
    if let Some(rates) = &run.rates {
        print_rates(rates);
    }
}

fn print_coverage(coverage: &[Coverage]) {
    let inexact: Vec<&Coverage> = coverage.iter().filter(|c| !c.is_exact()).collect();
    if inexact.is_empty() {
        eprintln!("Coverage: all {} subjects covered exactly", coverage.len());
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Subject"),
        header_cell("Expected"),
        header_cell("Covered"),
        header_cell("Gaps"),
        header_cell("Overlaps"),
        header_cell("Outside"),
        header_cell("% covered"),
    ]);
    apply_table_style(&mut table);
    for column in 1..7 {
        align_column(&mut table, column, CellAlignment::Right);
    }
    for row in inexact.iter().take(COVERAGE_ROWS) {
        table.add_row(vec![
            Cell::new(row.id),
            Cell::new(row.expected_days),
            Cell::new(row.covered_days),
            count_cell(row.gap_days, Color::Red),
            count_cell(row.overlap_days, Color::Red),
            count_cell(row.outside_days, Color::Yellow),
            Cell::new(format!("{:.1}", row.percent_covered())),
        ]);
    }
    eprintln!();
    eprintln!("Coverage problems ({} of {} subjects):", inexact.len(), coverage.len());
    eprintln!("{table}");
}

fn print_rates(rates: &RateSummary) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell(&rates.by),
        header_cell("Segments"),
        header_cell("Events"),
        header_cell("Person-years"),
        header_cell("Rate / 1000 PY"),
    ]);
    apply_table_style(&mut table);
    for column in 1..5 {
        align_column(&mut table, column, CellAlignment::Right);
    }
    for row in &rates.rows {
        table.add_row(vec![
            Cell::new(&row.level).fg(Color::Blue),
            Cell::new(row.segments),
            Cell::new(row.events),
            Cell::new(format!("{:.2}", row.person_years)),
            Cell::new(format!("{:.2}", row.rate)),
        ]);
    }
    eprintln!();
    eprintln!("Crude rates:");
    eprintln!("{table}");
}

fn print_output_line(output: Option<&std::path::Path>) {
    match output {
        Some(path) => eprintln!("Output: {}", path.display()),
        None => eprintln!("Output: stdout"),
    }
}

fn metric_table() -> Table {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Metric"), header_cell("Value")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    table
}

fn add_metric<T: ToString>(table: &mut Table, label: &str, value: T) {
    table.add_row(vec![Cell::new(label), Cell::new(value)]);
}

/// Row that is highlighted when non-zero.
fn add_warning(table: &mut Table, label: &str, value: usize) {
    table.add_row(vec![Cell::new(label), count_cell(value as i64, Color::Yellow)]);
}

fn count_cell(value: i64, color: Color) -> Cell {
    if value > 0 {
        Cell::new(value).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(value)
    }
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
