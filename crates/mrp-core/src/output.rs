//! Rendering of run reports for the terminal.
//!
//! JSON output is the serde form of [`MrpReport`]; this module covers the
//! Markdown and one-line summary formats.

use std::fmt::Write as _;

use mrp_common::OutputFormat;

use crate::coefficients::CoefficientScale;
use crate::pipeline::MrpReport;

/// Render `report` in `format`.
pub fn render(report: &MrpReport, format: OutputFormat) -> mrp_common::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Md => render_markdown(report),
        OutputFormat::Summary => render_summary(report),
    })
}

fn percent(p: f64) -> String {
    format!("{:.1}%", 100.0 * p)
}

/// One line: estimate, interval and convergence status.
pub fn render_summary(report: &MrpReport) -> String {
    let e = &report.estimate.estimate;
    let status = if report.reliable {
        "converged".to_string()
    } else {
        format!("UNRELIABLE, {} warnings", report.warnings.len())
    };
    format!(
        "ownership {} (95% CI {} to {}) over {} people in {} strata; max psrf {:.3} [{}]",
        percent(e.mean),
        percent(e.q2_5),
        percent(e.q97_5),
        report.estimate.total_population,
        report.estimate.n_strata,
        report.diagnostics.max_psrf,
        status
    )
}

/// Markdown report with estimate, coefficient, diagnostic and warning tables.
pub fn render_markdown(report: &MrpReport) -> String {
    let mut out = String::new();
    let e = &report.estimate.estimate;

    let _ = writeln!(out, "# Dwelling ownership estimate\n");
    let _ = writeln!(
        out,
        "Post-stratified ownership rate: **{}** (95% interval {} to {})\n",
        percent(e.mean),
        percent(e.q2_5),
        percent(e.q97_5)
    );
    let _ = writeln!(
        out,
        "Model `{}` fitted to {} respondents with {} chains of {} draws.\n",
        report.model.formula,
        report.model.n_observations,
        report.model.n_chains,
        report.model.n_draws_per_chain
    );

    let _ = writeln!(out, "## By province\n");
    let _ = writeln!(out, "| Province | Population | Estimate | 2.5% | 97.5% |");
    let _ = writeln!(out, "|---|---:|---:|---:|---:|");
    for p in &report.estimate.by_province {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            p.province,
            p.population,
            percent(p.estimate.mean),
            percent(p.estimate.q2_5),
            percent(p.estimate.q97_5)
        );
    }

    let _ = writeln!(out, "\n## Coefficients\n");
    let _ = writeln!(
        out,
        "| Parameter | Reference | Logit mean | Estimate | 2.5% | 97.5% |"
    );
    let _ = writeln!(out, "|---|---|---:|---:|---:|---:|");
    for row in &report.coefficients {
        let fmt = |v: f64| match row.scale {
            CoefficientScale::Probability => format!("{:.3}", v),
            CoefficientScale::Natural => format!("{:.3} (sd)", v),
        };
        let _ = writeln!(
            out,
            "| {} | {} | {:.3} | {} | {} | {} |",
            row.parameter,
            row.reference.as_deref().unwrap_or("-"),
            row.logit_mean,
            fmt(row.point_estimate),
            fmt(row.lower_bound),
            fmt(row.upper_bound)
        );
    }

    let _ = writeln!(out, "\n## Convergence\n");
    let _ = writeln!(out, "| Parameter | PSRF | Upper CI | Split R-hat | ESS | Converged |");
    let _ = writeln!(out, "|---|---:|---:|---:|---:|:---:|");
    for p in &report.diagnostics.parameters {
        let _ = writeln!(
            out,
            "| {} | {:.3} | {:.3} | {:.3} | {:.0} | {} |",
            p.parameter,
            p.psrf,
            p.psrf_upper,
            p.split_rhat,
            p.ess,
            if p.converged { "yes" } else { "**no**" }
        );
    }

    let _ = writeln!(out, "\n## Posterior predictive check\n");
    let _ = writeln!(out, "{}\n", report.ppc.summary);

    if !report.warnings.is_empty() {
        let _ = writeln!(out, "## Warnings\n");
        for w in &report.warnings {
            let _ = writeln!(out, "- {}", w);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Stratum, StratumTable};
    use crate::fit::test_support::{quick_sampler, simulated_observations};
    use crate::pipeline::run_pipeline;
    use crate::sampler::CancellationToken;
    use mrp_common::categories::Cell;
    use mrp_common::MrpConfig;
    use std::sync::OnceLock;

    fn report() -> &'static MrpReport {
        static REPORT: OnceLock<MrpReport> = OnceLock::new();
        REPORT.get_or_init(|| {
            let mut config = MrpConfig::default();
            config.sampler = quick_sampler();
            config.predictive.draws = 50;
            let strata = StratumTable::new(
                Cell::all()
                    .map(|c| Stratum::new(c.province, c.age_group, c.sex, 1000))
                    .collect(),
            )
            .unwrap();
            run_pipeline(
                &simulated_observations(300, 0.5, 13),
                &strata,
                &config,
                &CancellationToken::new(),
            )
            .unwrap()
        })
    }

    #[test]
    fn summary_is_one_line() {
        let line = render_summary(report());
        assert!(line.starts_with("ownership "));
        assert!(line.contains("100 strata"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn markdown_has_all_sections() {
        let md = render_markdown(report());
        for heading in ["# Dwelling ownership estimate", "## By province", "## Coefficients", "## Convergence"] {
            assert!(md.contains(heading), "missing {}", heading);
        }
        assert!(md.contains("| b_sex[Male] | Female |"));
        assert!(md.contains("(sd)"));
    }

    #[test]
    fn json_round_trips_through_serde_value() {
        let json = render(report(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["estimate"]["n_strata"], 100);
    }
}
