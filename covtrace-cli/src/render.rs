//! Text and Markdown views of a coverage result.

use std::fmt::Write;

use covtrace_core::{CoverageResult, EntryState, OrphanClass};

pub(crate) fn render_text(result: &CoverageResult) -> String {
    let summary = result.summary();
    let mut output = String::new();

    let _ = writeln!(output, "Coverage report");
    let _ = writeln!(
        output,
        "Endpoints: {}  Fully covered: {}  Orphan APIs: {}",
        summary.endpoints, summary.fully_covered, summary.orphan_apis
    );
    let _ = writeln!(
        output,
        "Phase 1: {} ({}/{} scenarios FULL)",
        percent(summary.phase1_coverage),
        summary.full_scenarios,
        summary.baseline_scenarios
    );
    let by_priority: Vec<String> = summary
        .gaps_by_priority
        .iter()
        .map(|count| format!("{} {}", count.priority, count.count))
        .collect();
    let _ = writeln!(output, "Gaps: {}", by_priority.join(", "));

    let _ = writeln!(output);
    let _ = writeln!(output, "Endpoints");
    for view in result.per_endpoint.values() {
        let mut flags = String::new();
        if view.fully_covered {
            flags.push_str(" [fully covered]");
        }
        if view.orphan {
            flags.push_str(" [orphan]");
        }
        let _ = writeln!(
            output,
            "  {} ({}): {}/{} FULL, {} partial, {} tests, {}{flags}",
            view.endpoint.key,
            view.endpoint.operation(),
            view.full_count,
            view.baseline_count,
            view.partial_count,
            view.test_count,
            percent(view.phase1_coverage)
        );
    }

    if !result.gaps.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Gaps");
        for gap in &result.gaps {
            let _ = writeln!(
                output,
                "  [{}] {} {}: {}",
                gap.priority, gap.endpoint_key, gap.scenario.category, gap.scenario.text
            );
            let _ = writeln!(output, "       reason: {}", gap.reason);
            let _ = writeln!(output, "       next: {}", gap.recommendation);
        }
    }

    if !result.orphan_apis.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Orphan APIs");
        for orphan in &result.orphan_apis {
            let _ = writeln!(
                output,
                "  [{}] {} ({}): {}",
                orphan.priority,
                orphan.endpoint.key,
                orphan.endpoint.operation(),
                orphan.reason
            );
        }
    }

    if !result.orphan_tests.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Orphan tests");
        for orphan in &result.orphan_tests {
            let label = match orphan.priority {
                Some(priority) => priority.to_string(),
                None => "info".to_string(),
            };
            let _ = writeln!(
                output,
                "  [{label}] {} ({}:{}): {}",
                orphan.test.declared_name,
                orphan.test.file_path.display(),
                orphan.test.line_number,
                orphan.reason
            );
        }
    }

    if !result.shared_attributions.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Shared tests");
        for shared in &result.shared_attributions {
            let _ = writeln!(
                output,
                "  {} -> {}",
                shared.test_id,
                shared.endpoint_keys.join(", ")
            );
        }
    }

    let suggested: Vec<_> = result
        .phase2
        .values()
        .filter(|view| view.suggested_count > 0)
        .collect();
    if !suggested.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Phase 2 (informational)");
        for view in suggested {
            let _ = writeln!(
                output,
                "  {}: {}/{} AI scenarios already in baseline ({})",
                view.endpoint_key,
                view.overlap_count,
                view.suggested_count,
                percent(view.phase2_coverage)
            );
            for suggestion in &view.suggestions {
                let marker = if suggestion.high_priority { "!" } else { "-" };
                let _ = writeln!(
                    output,
                    "    {marker} {}: {}",
                    suggestion.scenario.category, suggestion.scenario.text
                );
            }
        }
    }

    output
}

pub(crate) fn render_markdown(result: &CoverageResult) -> String {
    let summary = result.summary();
    let mut output = String::new();

    let _ = writeln!(output, "# Coverage report");
    let _ = writeln!(output);
    let _ = writeln!(output, "| Metric | Value |");
    let _ = writeln!(output, "| --- | --- |");
    let _ = writeln!(output, "| Endpoints | {} |", summary.endpoints);
    let _ = writeln!(output, "| Fully covered | {} |", summary.fully_covered);
    let _ = writeln!(output, "| Orphan APIs | {} |", summary.orphan_apis);
    let _ = writeln!(
        output,
        "| Phase 1 | {} ({}/{}) |",
        percent(summary.phase1_coverage),
        summary.full_scenarios,
        summary.baseline_scenarios
    );
    for count in &summary.gaps_by_priority {
        let _ = writeln!(output, "| {} gaps | {} |", count.priority, count.count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Endpoints");
    let _ = writeln!(output);
    let _ = writeln!(output, "| Endpoint | Operation | FULL | PARTIAL | NONE | Tests | Phase 1 |");
    let _ = writeln!(output, "| --- | --- | --- | --- | --- | --- | --- |");
    for view in result.per_endpoint.values() {
        let _ = writeln!(
            output,
            "| {} | `{}` | {} | {} | {} | {} | {} |",
            view.endpoint.key,
            view.endpoint.operation(),
            view.full_count,
            view.partial_count,
            view.none_count,
            view.test_count,
            percent(view.phase1_coverage)
        );
    }

    if !result.gaps.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Gaps");
        let _ = writeln!(output);
        let _ = writeln!(output, "| Priority | Endpoint | Scenario | Reason | Recommendation |");
        let _ = writeln!(output, "| --- | --- | --- | --- | --- |");
        for gap in &result.gaps {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} |",
                gap.priority,
                gap.endpoint_key,
                cell(&gap.scenario.text),
                cell(&gap.reason),
                cell(&gap.recommendation)
            );
        }
    }

    if !result.orphan_apis.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Orphan APIs");
        let _ = writeln!(output);
        let _ = writeln!(output, "| Priority | Endpoint | Operation | Baseline entry |");
        let _ = writeln!(output, "| --- | --- | --- | --- |");
        for orphan in &result.orphan_apis {
            let _ = writeln!(
                output,
                "| {} | {} | `{}` | {} |",
                orphan.priority,
                orphan.endpoint.key,
                orphan.endpoint.operation(),
                state_label(orphan.catalogue_state)
            );
        }
    }

    if !result.orphan_tests.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Orphan tests");
        let _ = writeln!(output);
        let _ = writeln!(output, "| Priority | Test | Location | Class | Reason |");
        let _ = writeln!(output, "| --- | --- | --- | --- | --- |");
        for orphan in &result.orphan_tests {
            let priority = orphan
                .priority
                .map(|priority| priority.to_string())
                .unwrap_or_else(|| "-".to_string());
            let class = match orphan.class {
                OrphanClass::Business => "business",
                OrphanClass::Technical => "technical",
            };
            let _ = writeln!(
                output,
                "| {priority} | {} | {}:{} | {class} | {} |",
                cell(&orphan.test.declared_name),
                orphan.test.file_path.display(),
                orphan.test.line_number,
                cell(&orphan.reason)
            );
        }
    }

    let suggested: Vec<_> = result
        .phase2
        .values()
        .filter(|view| view.suggested_count > 0)
        .collect();
    if !suggested.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Phase 2 completeness (informational)");
        for view in suggested {
            let _ = writeln!(output);
            let _ = writeln!(
                output,
                "### {} ({}/{} already in baseline, {})",
                view.endpoint_key,
                view.overlap_count,
                view.suggested_count,
                percent(view.phase2_coverage)
            );
            for suggestion in &view.suggestions {
                let flag = if suggestion.high_priority {
                    " **high priority**"
                } else {
                    ""
                };
                let _ = writeln!(
                    output,
                    "- {}: {}{flag}",
                    suggestion.scenario.category, suggestion.scenario.text
                );
            }
        }
    }

    output
}

fn percent(ratio: Option<f64>) -> String {
    match ratio {
        Some(ratio) => format!("{:.1}%", ratio * 100.0),
        None => "n/a".to_string(),
    }
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn state_label(state: EntryState) -> &'static str {
    match state {
        EntryState::Populated => "populated",
        EntryState::Empty => "empty",
        EntryState::Null => "null",
        EntryState::Commented => "commented out",
        EntryState::Absent => "absent",
    }
}
