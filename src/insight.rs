use std::fmt::Write as _;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::analysis::{GroupImpact, SimulationSummary};
use crate::baseline::{BASELINE_TAX_RATE, BaselineMetrics};
use crate::error::InsightError;
use crate::policy::{PolicySettings, REFERENCE_WAGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsightKind {
    Policy,
    Equity,
    Environmental,
}

impl InsightKind {
    pub const ALL: [InsightKind; 3] =
        [InsightKind::Policy, InsightKind::Equity, InsightKind::Environmental];

    /// Reply length budget requested from the remote service.
    pub fn max_output_tokens(self) -> u32 {
        match self {
            InsightKind::Policy => 1024,
            InsightKind::Equity => 512,
            InsightKind::Environmental => 256,
        }
    }
}

impl std::fmt::Display for InsightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InsightKind::Policy => "policy",
            InsightKind::Equity => "equity",
            InsightKind::Environmental => "environmental",
        };
        f.write_str(s)
    }
}

/// A text-completion backend. Implementations must be callable from several
/// threads at once.
pub trait InsightService: Sync {
    fn complete(&self, kind: InsightKind, prompt: &str) -> Result<String, InsightError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insights {
    pub policy: String,
    pub equity: String,
    pub environmental: String,
}

/// Relative change in percent; zero when the reference is zero.
fn pct_change(new: f64, old: f64) -> f64 {
    if old == 0.0 { 0.0 } else { (new - old) / old * 100.0 }
}

fn signed_k(change: f64) -> String {
    let sign = if change > 0.0 { "+" } else { "" };
    format!("{sign}${:.1}k", change / 1_000.0)
}

fn impact_lines(out: &mut String, groups: &[GroupImpact]) {
    for g in groups {
        let _ = writeln!(
            out,
            "- {}: {} ({:.1}%)",
            g.group,
            signed_k(g.mean_income_change),
            g.percent_change
        );
    }
}

/// Render the request text for `kind`.
pub fn prompt(
    kind: InsightKind,
    summary: &SimulationSummary,
    baseline: &BaselineMetrics,
    policy: &PolicySettings,
) -> String {
    match kind {
        InsightKind::Policy => policy_prompt(summary, baseline, policy),
        InsightKind::Equity => equity_prompt(summary),
        InsightKind::Environmental => environmental_prompt(summary, baseline, policy),
    }
}

fn policy_prompt(
    summary: &SimulationSummary,
    baseline: &BaselineMetrics,
    policy: &PolicySettings,
) -> String {
    let s = &summary.summary;
    let mut out = String::from(
        "You are a policy analysis expert. Analyze the following simulation results and \
         provide a concise policy recommendation (2-3 sentences max).\n\n",
    );
    let _ = writeln!(out, "**Policy Settings:**");
    let _ = writeln!(out, "- Minimum Wage: ${}/hr (baseline: ${REFERENCE_WAGE}/hr)", policy.min_wage);
    let _ = writeln!(out, "- Carbon Tax: ${}/mile/year", policy.carbon_tax);
    let _ = writeln!(out, "- Housing Subsidy: ${}/month", policy.housing_subsidy);
    let _ = writeln!(
        out,
        "- Income Tax Rate: {:.0}% (baseline: {:.0}%)",
        policy.tax_rate * 100.0,
        BASELINE_TAX_RATE * 100.0
    );
    let _ = writeln!(out, "- Education Subsidy: ${}/year", policy.education_subsidy);
    let _ = writeln!(out, "- Transit Subsidy: ${}/year", policy.transit_subsidy);
    let _ = writeln!(out, "- EV Incentive: ${}", policy.ev_incentive);
    let _ = writeln!(out, "- Green Jobs Incentive: {}%", policy.green_jobs_incentive);

    let _ = writeln!(out, "\n**Results vs Baseline:**");
    let _ = writeln!(
        out,
        "- Average Income: ${:.1}k (was ${:.1}k) - Change: {:.1}%",
        s.income.mean / 1_000.0,
        baseline.mean_income / 1_000.0,
        pct_change(s.income.mean, baseline.mean_income)
    );
    let _ = writeln!(
        out,
        "- Gini Coefficient: {:.3} (was {:.3}) - Change: {:.1}%",
        s.gini.mean,
        baseline.gini,
        pct_change(s.gini.mean, baseline.gini)
    );
    let _ = writeln!(
        out,
        "- Employment Rate: {:.1}% (was {:.1}%) - Change: {:.1}%",
        s.employment.mean * 100.0,
        baseline.employment_rate * 100.0,
        pct_change(s.employment.mean, baseline.employment_rate)
    );
    let _ = writeln!(
        out,
        "- CO2 Emissions: {:.2} tons (was {:.2} tons) - Change: {:.1}%",
        s.emissions.mean / 1_000.0,
        baseline.co2_per_capita / 1_000.0,
        pct_change(s.emissions.mean, baseline.co2_per_capita)
    );
    let _ = writeln!(
        out,
        "- Rent Burden: {:.1}% (was {:.1}%) - Change: {:.1}%",
        s.rent_burden.mean * 100.0,
        baseline.mean_rent_burden * 100.0,
        pct_change(s.rent_burden.mean, baseline.mean_rent_burden)
    );

    let brackets = &summary.equity.by_income_bracket;
    if let (Some(top), Some(bottom)) = (brackets.first(), brackets.last()) {
        let _ = writeln!(out, "\n**Equity Impact:**");
        let _ = writeln!(
            out,
            "- Most Benefited Income Bracket: {} ({}, {:.1}%)",
            top.group,
            signed_k(top.mean_income_change),
            top.percent_change
        );
        let _ = writeln!(
            out,
            "- Most Negatively Impacted: {} ({}, {:.1}%)",
            bottom.group,
            signed_k(bottom.mean_income_change),
            bottom.percent_change
        );
    }

    out.push_str(
        "\nProvide a balanced assessment highlighting:\n\
         1. Main positive impacts\n\
         2. Main concerns or trade-offs\n\
         3. One specific recommendation to improve outcomes\n\n\
         Keep it concise and actionable.",
    );
    out
}

fn equity_prompt(summary: &SimulationSummary) -> String {
    let mut out = String::from(
        "You are an equity policy analyst. Analyze the following demographic impacts and \
         provide a brief analysis with clear sections.\n\n\
         Format your response like this:\n\
         **Overall Assessment:** [1-2 sentences on whether policy is progressive/regressive]\n\n\
         **Income Disparities:** [Key findings about income bracket impacts]\n\n\
         **Recommendation:** [One specific suggestion to improve equity]\n\n\
         Keep it concise - about 4-5 sentences total.\n\n",
    );
    let _ = writeln!(out, "**Impact by Income Bracket:**");
    impact_lines(&mut out, &summary.equity.by_income_bracket);
    let _ = writeln!(out, "\n**Impact by Employment Sector:**");
    impact_lines(&mut out, &summary.equity.by_sector);
    out.push_str(
        "\nFocus on: 1) Which groups benefit most/least, 2) Any concerning disparities, \
         3) Whether the policy is progressive or regressive overall.",
    );
    out
}

fn environmental_prompt(
    summary: &SimulationSummary,
    baseline: &BaselineMetrics,
    policy: &PolicySettings,
) -> String {
    let s = &summary.summary;
    let mut out = String::from(
        "As an environmental policy analyst, provide a brief 2-sentence assessment of these \
         environmental impacts:\n\n",
    );
    let _ = writeln!(
        out,
        "**Emissions:** {:.1}% change (now {:.2} tons CO2/person/year)",
        pct_change(s.emissions.mean, baseline.co2_per_capita),
        s.emissions.mean / 1_000.0
    );
    let _ = writeln!(
        out,
        "**Energy Use:** {:.1}% change (now {:.0} kWh/month)",
        pct_change(s.energy_use.mean, baseline.mean_energy_use),
        s.energy_use.mean
    );
    let _ = writeln!(out, "\n**Policy Factors:**");
    let _ = writeln!(out, "- Carbon Tax: ${}/mile/year", policy.carbon_tax);
    let _ = writeln!(out, "- Transit Subsidy: ${}/year", policy.transit_subsidy);
    let _ = writeln!(out, "- EV Incentive: ${}", policy.ev_incentive);
    let _ = writeln!(out, "- Green Jobs Incentive: {}%", policy.green_jobs_incentive);
    out.push_str("\nHighlight: 1) Overall environmental impact, 2) Most effective policy lever.");
    out
}

// ── Offline fallbacks ───────────────────────────────────────────────────────

pub fn fallback(kind: InsightKind, summary: &SimulationSummary, baseline: &BaselineMetrics) -> String {
    match kind {
        InsightKind::Policy => fallback_policy(summary, baseline),
        InsightKind::Equity => fallback_equity(&summary.equity.by_income_bracket),
        InsightKind::Environmental => fallback_environmental(summary, baseline),
    }
}

fn fallback_policy(summary: &SimulationSummary, baseline: &BaselineMetrics) -> String {
    let s = &summary.summary;
    let gini_change = s.gini.mean - baseline.gini;
    let income_change = s.income.mean - baseline.mean_income;
    let emissions_change = s.emissions.mean - baseline.co2_per_capita;

    if gini_change > 0.01 {
        format!(
            "This policy combination increases inequality by {:.1}%. Consider adding progressive \
             measures like higher housing subsidies or education programs to offset regressive effects.",
            pct_change(s.gini.mean, baseline.gini)
        )
    } else if income_change < -1_000.0 {
        format!(
            "While inequality improves, average income declines by ${:.1}k. Consider balancing \
             wage policies with employment support to maintain income levels.",
            income_change.abs() / 1_000.0
        )
    } else if emissions_change < -500.0 {
        format!(
            "This policy shows strong environmental benefits with {:.1}% emissions reduction, \
             while maintaining economic stability. Consider scaling up green incentives further.",
            pct_change(s.emissions.mean, baseline.co2_per_capita).abs()
        )
    } else {
        format!(
            "This policy combination shows positive results with income increasing to ${:.1}k \
             and inequality decreasing by {:.1}%. The trade-offs appear balanced.",
            s.income.mean / 1_000.0,
            -pct_change(s.gini.mean, baseline.gini)
        )
    }
}

/// Compares the highest- and lowest-ranked income brackets.
fn fallback_equity(brackets: &[GroupImpact]) -> String {
    let (Some(top), Some(bottom)) = (brackets.first(), brackets.last()) else {
        return "No income bracket impacts were recorded for this run.".to_string();
    };
    if top.percent_change < bottom.percent_change {
        format!(
            "Higher income groups benefit more (+{:.1}% for {}) compared to lower income groups \
             ({:.1}% for {}), suggesting regressive impacts. Consider strengthening progressive measures.",
            top.percent_change, top.group, bottom.percent_change, bottom.group
        )
    } else {
        format!(
            "Lower income groups see greater relative benefits (+{:.1}% for {}), indicating \
             progressive policy outcomes. The policy effectively targets those most in need.",
            top.percent_change, top.group
        )
    }
}

fn fallback_environmental(summary: &SimulationSummary, baseline: &BaselineMetrics) -> String {
    let change = pct_change(summary.summary.emissions.mean, baseline.co2_per_capita);
    if change < -10.0 {
        format!(
            "Emissions decrease significantly by {:.1}%, demonstrating strong environmental \
             benefits. Transit and EV incentives are working effectively to shift commuter behavior.",
            change.abs()
        )
    } else if change > 5.0 {
        format!(
            "Emissions increase by {change:.1}%, suggesting environmental policies need \
             strengthening. Consider increasing carbon taxes or transit subsidies to drive cleaner \
             transportation choices."
        )
    } else {
        format!(
            "Emissions remain relatively stable with {:.1}% change. Additional environmental \
             incentives may be needed to achieve meaningful emission reductions.",
            change.abs()
        )
    }
}

// ── Entry points ────────────────────────────────────────────────────────────

/// Ask `service` for one narrative; fall back to the local template on any
/// failure. Never errors.
pub fn summarize(
    service: Option<&dyn InsightService>,
    kind: InsightKind,
    summary: &SimulationSummary,
    baseline: &BaselineMetrics,
    policy: &PolicySettings,
) -> String {
    let reply = match service {
        Some(svc) => svc.complete(kind, &prompt(kind, summary, baseline, policy)),
        None => Err(InsightError::Unavailable),
    };
    match reply {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            log::warn!("{kind} insight: {}; using local summary", InsightError::EmptyResponse);
            fallback(kind, summary, baseline)
        }
        Err(InsightError::Unavailable) => fallback(kind, summary, baseline),
        Err(e) => {
            log::warn!("{kind} insight: {e}; using local summary");
            fallback(kind, summary, baseline)
        }
    }
}

/// Produce all three narratives concurrently. A slow or failing call affects
/// only its own text.
pub fn summarize_all(
    service: Option<&dyn InsightService>,
    summary: &SimulationSummary,
    baseline: &BaselineMetrics,
    policy: &PolicySettings,
) -> Insights {
    let [policy_text, equity, environmental] = thread::scope(|scope| {
        let handles = InsightKind::ALL.map(|kind| {
            scope.spawn(move || summarize(service, kind, summary, baseline, policy))
        });
        handles.map(|h| h.join().unwrap_or_else(|_| String::new()))
    });
    let or_fallback = |text: String, kind| {
        if text.is_empty() { fallback(kind, summary, baseline) } else { text }
    };
    Insights {
        policy: or_fallback(policy_text, InsightKind::Policy),
        equity: or_fallback(equity, InsightKind::Equity),
        environmental: or_fallback(environmental, InsightKind::Environmental),
    }
}
