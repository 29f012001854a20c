use crate::model::VerificationReport;

/// Render a deterministic markdown report.
pub fn render_report(report: &VerificationReport) -> String {
    let mut lines = Vec::new();

    lines.push("# Inboxforge Verification Report".to_string());
    lines.push(String::new());
    lines.push("## Store layout".to_string());
    lines.push(format!("- body storage: {:?}", report.layout.body));
    lines.push(format!(
        "- full-text backing: {}",
        report
            .layout
            .fts
            .map(|fts| format!("{fts:?}"))
            .unwrap_or_else(|| "-".to_string())
    ));
    lines.push(format!(
        "- sender in recipients: {}",
        report.layout.recipient_from_role
    ));
    lines.push(String::new());

    lines.push("## Checks".to_string());
    lines.push("| check | checked | violations |".to_string());
    lines.push("| --- | --- | --- |".to_string());
    for check in &report.checks {
        let violations = if check.skipped {
            "skipped".to_string()
        } else {
            check.violations.to_string()
        };
        lines.push(format!(
            "| {} | {} | {} |",
            check.code, check.checked, violations
        ));
    }
    lines.push(String::new());

    if !report.violations.is_empty() {
        lines.push("## Top violations".to_string());
        for violation in &report.violations {
            lines.push(format!(
                "- {} {}: {}",
                violation.code, violation.subject, violation.message
            ));
        }
        lines.push(String::new());
    }

    let verdict = if report.is_clean() {
        "clean".to_string()
    } else {
        format!("{} violation(s)", report.violation_count())
    };
    lines.push(format!("Result: {verdict}"));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CheckSummary, VERIFICATION_VERSION, Violation};
    use inboxforge_core::{BodyStorage, FtsBacking, FtsColumns, MessageColumns, SchemaLayout};

    fn report(violations: u64) -> VerificationReport {
        VerificationReport {
            verification_version: VERIFICATION_VERSION.to_string(),
            layout: SchemaLayout {
                body: BodyStorage::Separate,
                message_columns: MessageColumns::default(),
                conversation_title: true,
                recipient_from_role: true,
                fts: Some(FtsBacking::Standalone),
                fts_columns: FtsColumns::default(),
            },
            checks: vec![
                CheckSummary {
                    code: "fts_completeness".to_string(),
                    checked: 10,
                    violations,
                    skipped: false,
                },
                CheckSummary {
                    code: "curated_thread".to_string(),
                    checked: 0,
                    violations: 0,
                    skipped: true,
                },
            ],
            violations: (0..violations)
                .map(|i| Violation {
                    code: "fts_completeness".to_string(),
                    subject: format!("messages:{i}"),
                    message: "missing from the full-text index".to_string(),
                })
                .collect(),
            duration_ms: 3,
        }
    }

    #[test]
    fn clean_report_has_no_violation_section() {
        let rendered = render_report(&report(0));
        assert!(rendered.contains("| curated_thread | 0 | skipped |"));
        assert!(!rendered.contains("## Top violations"));
        assert!(rendered.ends_with("Result: clean"));
    }

    #[test]
    fn lists_violations() {
        let rendered = render_report(&report(2));
        assert!(rendered.contains("- fts_completeness messages:1: missing from the full-text index"));
        assert!(rendered.ends_with("Result: 2 violation(s)"));
    }
}
