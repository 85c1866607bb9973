//! Formatted terminal output for fits and coupling patterns.
//!
//! Formatting lives here so the fitting code stays free of presentation and
//! output changes are localized.

use crate::domain::{FitConfig, FittedSignal};
use crate::fit::FitReport;
use crate::models::CouplingPattern;

use super::{ResidualRankings, ResidualRow};

/// Run header plus optimizer statistics.
pub fn format_fit_summary(report: &FitReport, config: &FitConfig, samples: usize) -> String {
    let mut out = String::new();

    out.push_str("=== mfit - multiplet fit ===\n");
    out.push_str(&format!("Request: {}\n", config.request_path.display()));
    match &config.data_path {
        Some(path) => out.push_str(&format!("Data: {} (n={samples})\n", path.display())),
        None => out.push_str(&format!("Data: simulated from request start values (n={samples})\n")),
    }
    out.push_str(&format!(
        "Optimizer: {} | evaluations={} | iterations={} | converged={}\n",
        report.optimizer, report.evaluations, report.iterations, report.converged
    ));
    out.push_str(&format!("RMS residual: {:.6}\n", report.residual));

    out.push_str("\nParameters:\n");
    for (name, value) in report.parameter_names.iter().zip(&report.params) {
        out.push_str(&format!("  {name:<14} {value:>12.4}\n"));
    }
    out.push('\n');

    out
}

/// One row per fitted signal; generic lines get their own indented rows.
pub fn format_signals(signals: &[FittedSignal]) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        format!(
            "{:<4} {:<6} {:>10} {:>8} {:>10} {:<}",
            "#", "mult", "center", "lw", "amp", "couplings"
        ),
    );
    push_row(
        &mut out,
        format!(
            "{:-<4} {:-<6} {:-<10} {:-<8} {:-<10} {:-<}",
            "", "", "", "", "", "---------"
        ),
    );

    for (i, signal) in signals.iter().enumerate() {
        match signal {
            FittedSignal::Coupled {
                center,
                linewidth,
                amplitude,
                multiplicity,
                couplings,
            } => {
                let js: Vec<String> =
                    couplings.iter().map(|c| format!("{:.2}", c.coupling)).collect();
                push_row(
                    &mut out,
                    format!(
                        "{i:<4} {multiplicity:<6} {center:>10.3} {linewidth:>8.3} {amplitude:>10.4} {}",
                        js.join(" ")
                    ),
                );
            }
            FittedSignal::Generic { linewidth, lines } => {
                push_row(
                    &mut out,
                    format!("{i:<4} {:<6} {:>10} {linewidth:>8.3}", "m", ""),
                );
                for line in lines {
                    push_row(
                        &mut out,
                        format!(
                            "{:<4} {:<6} {:>10.3} {:>8} {:>10.4}",
                            "", "", line.frequency, "", line.amplitude
                        ),
                    );
                }
            }
        }
    }

    out
}

/// Per-sample dump of observed, modeled and residual intensity.
pub fn format_residual_table(rows: &[ResidualRow]) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        format!("{:>10} {:>12} {:>12} {:>12}", "x", "observed", "model", "residual"),
    );
    push_row(
        &mut out,
        format!("{:-<10} {:-<12} {:-<12} {:-<12}", "", "", "", ""),
    );
    for r in rows {
        push_row(
            &mut out,
            format!(
                "{:>10.3} {:>12.5} {:>12.5} {:>12.5}",
                r.x, r.observed, r.model, r.residual
            ),
        );
    }
    out
}

/// Largest residuals on each side of the model.
pub fn format_rankings(rankings: &ResidualRankings) -> String {
    let mut out = String::new();

    out.push_str("Largest excess (observed above model):\n");
    out.push_str(&format_residual_table(&rankings.over));
    out.push('\n');

    out.push_str("Largest deficit (observed below model):\n");
    out.push_str(&format_residual_table(&rankings.under));

    out
}

/// Summary of a coupling pattern and its lines.
pub fn format_pattern(pattern: &CouplingPattern) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Pattern: {} | couplings: {} | lines={}\n",
        pattern.multiplicity(),
        pattern.couplings_as_string(),
        pattern.line_count()
    ));
    push_row(&mut out, format!("{:>10} {:>12}", "offset", "intensity"));
    push_row(&mut out, format!("{:-<10} {:-<12}", "", ""));
    for (f, a) in pattern.frequencies().iter().zip(pattern.intensities()) {
        push_row(&mut out, format!("{f:>10.3} {a:>12.4}"));
    }
    out
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CouplingItem, FittedLine};

    #[test]
    fn pattern_table_lists_lines() {
        let pattern = CouplingPattern::new(vec![CouplingItem::plain(10.0, 2)], 1.0).unwrap();
        let text = format_pattern(&pattern);
        let expected = concat!(
            "Pattern: d | couplings: 10 | lines=2\n",
            "    offset    intensity\n",
            "---------- ------------\n",
            "    -5.000       1.0000\n",
            "     5.000       1.0000\n",
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn signals_table_shows_multiplicity_and_generic_lines() {
        let signals = vec![
            FittedSignal::Coupled {
                center: 15.0,
                linewidth: 2.0,
                amplitude: 1.0,
                multiplicity: "dd".to_string(),
                couplings: vec![CouplingItem::plain(4.0, 2), CouplingItem::plain(10.0, 2)],
            },
            FittedSignal::Generic {
                linewidth: 3.0,
                lines: vec![
                    FittedLine { frequency: 40.0, amplitude: 0.5 },
                    FittedLine { frequency: 60.0, amplitude: 0.25 },
                ],
            },
        ];
        let text = format_signals(&signals);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[2].starts_with("0    dd"), "{}", lines[2]);
        assert!(lines[2].ends_with("4.00 10.00"), "{}", lines[2]);
        assert!(lines[3].starts_with("1    m"), "{}", lines[3]);
        assert!(lines[4].contains("40.000"));
        assert!(lines[5].contains("0.2500"));
    }

    #[test]
    fn residual_table_has_header_and_rows() {
        let rows = vec![ResidualRow { x: 1.0, observed: 2.0, model: 1.5, residual: 0.5 }];
        let text = format_residual_table(&rows);
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(2).unwrap().ends_with("0.50000"));
    }
}
